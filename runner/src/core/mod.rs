//! Deterministic, pure logic for the run pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests. Time enters only
//! through the [`gate::Clock`] trait.

pub mod classifier;
pub mod command;
pub mod gate;
pub mod report;
pub mod tap;
pub mod types;
