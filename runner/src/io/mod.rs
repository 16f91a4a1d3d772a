//! I/O adapters for the run pipeline.

pub mod config;
pub mod executor;
pub mod process;
pub mod sink;
pub mod telemetry;
pub mod tutorial_store;
pub mod watch;
