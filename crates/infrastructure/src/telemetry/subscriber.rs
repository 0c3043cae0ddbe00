//! Subscriber initialization and configuration

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Configuration for logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "caldav_client=debug"); `RUST_LOG`
    /// takes precedence when set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line number
    #[serde(default)]
    pub with_file: bool,

    /// Colored output (text format only)
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_log_filter() -> String {
    "caldav_client=info,caldav_infrastructure=info".to_string()
}

const fn default_ansi() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            format: LogFormat::default(),
            with_file: false,
            ansi: default_ansi(),
        }
    }
}

/// Install the global subscriber
///
/// Returns `Ok(true)` when this call installed it and `Ok(false)` when an
/// earlier call already had, so libraries and tests can call it freely.
///
/// # Example
///
/// ```ignore
/// use caldav_infrastructure::{AppConfig, init_telemetry};
///
/// let config = AppConfig::load()?;
/// init_telemetry(&config.telemetry)?;
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> Result<bool, TelemetryError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    let result = install(config);
    if result.is_err() {
        INITIALIZED.store(false, Ordering::SeqCst);
    }
    result?;

    info!(format = ?config.format, "Telemetry initialized");
    Ok(true)
}

fn install(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)
            .map_err(|e| TelemetryError::Filter(format!("{}: {e}", config.log_filter)))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let initialized = match config.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_ansi(config.ansi)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(config.with_file)
                    .with_line_number(config.with_file),
            )
            .try_init(),
    };
    initialized.map_err(|e| TelemetryError::Init(e.to_string()))
}

/// Error type for telemetry initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),

    /// The configured filter directive is malformed
    #[error("Invalid log filter: {0}")]
    Filter(String),
}
