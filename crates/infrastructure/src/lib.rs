//! Infrastructure layer for the CalDAV client
//!
//! Layered configuration (defaults, TOML file, environment), startup
//! validation of that configuration and the tracing subscriber setup.

pub mod config;
pub mod telemetry;
pub mod validation;

pub use config::{AppConfig, CalDavAppConfig, ConfigError};
pub use telemetry::{LogFormat, TelemetryConfig, TelemetryError, init_telemetry};
pub use validation::{ConfigValidator, ConfigWarning, WarningSeverity};
