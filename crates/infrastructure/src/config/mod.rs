//! Application configuration
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. a TOML file (`caldav.toml` in the working directory, or an explicit path)
//! 3. environment variables prefixed `CALDAV_`, nested with `__`
//!    (e.g. `CALDAV_CALDAV__URL`, `CALDAV_TELEMETRY__FORMAT`)

mod caldav;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::telemetry::TelemetryConfig;
use crate::validation::{ConfigValidator, ConfigWarning};

pub use caldav::CalDavAppConfig;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "CALDAV";

/// Base name of the optional configuration file
pub const DEFAULT_CONFIG_FILE: &str = "caldav";

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration has critical problems
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// CalDAV server connection
    #[serde(default)]
    pub caldav: CalDavAppConfig,

    /// Logging setup
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from `caldav.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(None, None)
    }

    /// Load from an explicit TOML file, which must exist, and the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::build(Some(path), None)
    }

    /// Load with a fixed set of variables standing in for the process
    /// environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: config::Map<String, String>,
    ) -> Result<Self, ConfigError> {
        Self::build(path, Some(env))
    }

    fn build(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder()
            // Start with defaults
            .set_default("caldav.verify_certs", true)?
            .set_default("caldav.timeout_secs", 30)?
            .add_source(file)
            // Override with environment variables (e.g., CALDAV_CALDAV__URL)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        debug!(
            url = ?config.caldav.url,
            calendar = ?config.caldav.calendar,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Run the startup checks, failing on critical findings
    ///
    /// Non-critical warnings are logged and returned.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let warnings = ConfigValidator::validate(self);
        ConfigValidator::log_warnings(&warnings);

        let critical: Vec<String> = warnings
            .iter()
            .filter(|w| w.is_critical())
            .map(|w| w.message.clone())
            .collect();
        if critical.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::Invalid(critical.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LogFormat;

    fn env(vars: &[(&str, &str)]) -> config::Map<String, String> {
        vars.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::load_with_env(None, env(&[])).expect("load");
        assert!(config.caldav.url.is_none());
        assert!(config.caldav.verify_certs);
        assert_eq!(config.caldav.timeout_secs, 30);
        assert_eq!(config.telemetry.format, LogFormat::Text);
    }

    #[test]
    fn environment_overrides() {
        let config = AppConfig::load_with_env(
            None,
            env(&[
                ("CALDAV_CALDAV__URL", "https://dav.example.com/"),
                ("CALDAV_CALDAV__USERNAME", "alice"),
                ("CALDAV_CALDAV__PASSWORD", "secret"),
                ("CALDAV_CALDAV__TIMEOUT_SECS", "10"),
                ("CALDAV_CALDAV__RETRY__MAX_RETRIES", "5"),
                ("CALDAV_TELEMETRY__FORMAT", "json"),
            ]),
        )
        .expect("load");

        assert_eq!(config.caldav.url.as_deref(), Some("https://dav.example.com/"));
        assert_eq!(config.caldav.username.as_deref(), Some("alice"));
        assert_eq!(config.caldav.password_str(), Some("secret"));
        assert_eq!(config.caldav.timeout_secs, 10);
        assert_eq!(config.caldav.retry.max_retries, 5);
        assert_eq!(config.telemetry.format, LogFormat::Json);
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let config = AppConfig::load_with_env(None, env(&[("HOME", "/root"), ("CALDAVX", "1")]))
            .expect("load");
        assert!(config.caldav.url.is_none());
    }

    #[test]
    fn validate_rejects_missing_url() {
        let result = AppConfig::default().validate();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_accepts_https_server() {
        let mut config = AppConfig::default();
        config.caldav.url = Some("https://dav.example.com/".to_string());
        let warnings = config.validate().expect("valid");
        assert!(warnings.iter().all(|w| !w.is_critical()));
    }
}
