//! Error telemetry for unexpected internal states.

use tracing::error;

/// Fire-and-forget fault reporting. Implementations must not block or fail.
pub trait Telemetry: Send + Sync {
    fn report(&self, error: &anyhow::Error);
}

/// Reports faults as `error!` events tagged with the crate version.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn report(&self, err: &anyhow::Error) {
        error!(
            version = env!("CARGO_PKG_VERSION"),
            err = %format!("{err:#}"),
            "internal fault"
        );
    }
}
