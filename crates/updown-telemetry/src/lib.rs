//! Telemetry: structured logging, secret redaction, and metrics.

pub mod error;
pub mod logging;
pub mod metrics;
pub mod redact;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use redact::redact;
