//! Logging setup
//!
//! Installs the global `tracing` subscriber used by the client's spans and
//! events.

mod subscriber;

pub use subscriber::{LogFormat, TelemetryConfig, TelemetryError, init_telemetry};
