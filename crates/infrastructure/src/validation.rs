//! Startup checks for the application configuration
//!
//! Findings are graded; critical ones make [`AppConfig::validate`] fail.

use std::fmt;

use crate::config::AppConfig;

/// Severity level for configuration warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningSeverity {
    /// Informational - no action required
    Info,
    /// Warning - should be addressed but not critical
    Warning,
    /// Critical - the client cannot work as configured
    Critical,
}

impl fmt::Display for WarningSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A configuration finding with severity and description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub severity: WarningSeverity,
    /// Short code identifying the warning type
    pub code: &'static str,
    pub message: String,
    pub recommendation: String,
}

impl ConfigWarning {
    #[must_use]
    pub fn new(
        severity: WarningSeverity,
        code: &'static str,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            recommendation: recommendation.into(),
        }
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self.severity, WarningSeverity::Critical)
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} - {}",
            self.severity, self.code, self.message, self.recommendation
        )
    }
}

/// Validates the CalDAV settings of an [`AppConfig`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration and return all warnings, critical first
    #[must_use]
    pub fn validate(config: &AppConfig) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        Self::check_server_url(config, &mut warnings);
        Self::check_tls_verification(config, &mut warnings);
        Self::check_credentials(config, &mut warnings);
        Self::check_timeout(config, &mut warnings);

        warnings.sort_by(|a, b| b.severity.cmp(&a.severity));
        warnings
    }

    /// Log all warnings using tracing
    pub fn log_warnings(warnings: &[ConfigWarning]) {
        for warning in warnings {
            match warning.severity {
                WarningSeverity::Critical => {
                    tracing::error!(
                        code = %warning.code,
                        message = %warning.message,
                        recommendation = %warning.recommendation,
                        "Configuration issue"
                    );
                },
                WarningSeverity::Warning => {
                    tracing::warn!(
                        code = %warning.code,
                        message = %warning.message,
                        recommendation = %warning.recommendation,
                        "Configuration warning"
                    );
                },
                WarningSeverity::Info => {
                    tracing::info!(
                        code = %warning.code,
                        message = %warning.message,
                        recommendation = %warning.recommendation,
                        "Configuration notice"
                    );
                },
            }
        }
    }

    fn check_server_url(config: &AppConfig, warnings: &mut Vec<ConfigWarning>) {
        match config.caldav.url.as_deref().map(str::trim) {
            None | Some("") => warnings.push(ConfigWarning::new(
                WarningSeverity::Critical,
                "CFG001",
                "No CalDAV server URL configured",
                "Set caldav.url or CALDAV_CALDAV__URL",
            )),
            Some(url) if !url.starts_with("https://") && !url.starts_with("http://") => {
                warnings.push(ConfigWarning::new(
                    WarningSeverity::Critical,
                    "CFG002",
                    format!("CalDAV server URL '{url}' is not an http(s) URL"),
                    "Use an http:// or https:// URL",
                ));
            },
            Some(_) => {},
        }
    }

    fn check_tls_verification(config: &AppConfig, warnings: &mut Vec<ConfigWarning>) {
        if !config.caldav.verify_certs {
            warnings.push(ConfigWarning::new(
                WarningSeverity::Warning,
                "CFG003",
                "TLS certificate verification is disabled",
                "Enable verify_certs unless the server uses a self-signed certificate",
            ));
        }
    }

    fn check_credentials(config: &AppConfig, warnings: &mut Vec<ConfigWarning>) {
        let caldav = &config.caldav;
        let plain_http = caldav
            .url
            .as_deref()
            .is_some_and(|u| u.trim().starts_with("http://"));

        if caldav.has_credentials() && plain_http {
            warnings.push(ConfigWarning::new(
                WarningSeverity::Warning,
                "CFG004",
                "Credentials are sent over unencrypted HTTP",
                "Use an https:// server URL",
            ));
        }
        if caldav.username.is_some() != caldav.password.is_some() {
            warnings.push(ConfigWarning::new(
                WarningSeverity::Info,
                "CFG005",
                "Only one of username and password is set; requests are sent without authentication",
                "Set both caldav.username and caldav.password",
            ));
        }
    }

    fn check_timeout(config: &AppConfig, warnings: &mut Vec<ConfigWarning>) {
        if config.caldav.timeout_secs == 0 {
            warnings.push(ConfigWarning::new(
                WarningSeverity::Critical,
                "CFG006",
                "CalDAV request timeout is zero",
                "Set caldav.timeout_secs to a positive number of seconds",
            ));
        }
    }
}
