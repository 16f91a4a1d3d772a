//! Test-run orchestration for interactive tutorials.
//!
//! Runs a tutorial's test command, parses its TAP output and reports one
//! classified outcome per run through a fixed callback contract. Concurrent
//! triggers share a single run slot: rapid starts are throttled and results
//! of superseded runs are dropped. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (gates, command building, TAP
//!   parsing, classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (process execution, config and
//!   tutorial files, output channels, telemetry, file watching).
//!
//! [`orchestrate`] wires core logic to the adapters.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tutorial;
