//! CalDAV connection settings

use caldav_client::{Calendar, CalDavError, DavClient, DavClientConfig, RetryConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::default_true;

/// CalDAV server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CalDavAppConfig {
    /// Server or principal URL (e.g., <https://dav.example.com/dav.php/>)
    #[serde(default)]
    pub url: Option<String>,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication (sensitive - uses `SecretString`)
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,

    /// Verify TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub verify_certs: bool,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_caldav_timeout")]
    pub timeout_secs: u64,

    /// Override for the `User-Agent` header
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Calendar opened by [`default_calendar`](Self::default_calendar),
    /// matched by display name or id
    #[serde(default)]
    pub calendar: Option<String>,

    /// Retry policy for read-only requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl std::fmt::Debug for CalDavAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalDavAppConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("verify_certs", &self.verify_certs)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("calendar", &self.calendar)
            .field("retry", &self.retry)
            .finish()
    }
}

const fn default_caldav_timeout() -> u64 {
    30
}

impl Default for CalDavAppConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            verify_certs: default_true(),
            timeout_secs: default_caldav_timeout(),
            user_agent: None,
            calendar: None,
            retry: RetryConfig::default(),
        }
    }
}

impl CalDavAppConfig {
    /// Convert to the client's `DavClientConfig`
    #[must_use]
    pub fn to_client_config(&self) -> DavClientConfig {
        let defaults = DavClientConfig::default();
        DavClientConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password_str().map(str::to_string),
            verify_certs: self.verify_certs,
            timeout_secs: self.timeout_secs,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            retry: self.retry.clone(),
        }
    }

    /// Build a client from this configuration
    ///
    /// Never fails; an unusable URL is reported by the first request.
    #[must_use]
    pub fn connect(&self) -> DavClient {
        debug!(url = ?self.url, username = ?self.username, "Creating CalDAV client");
        DavClient::new(self.to_client_config())
    }

    /// Open the configured calendar of the current user's principal
    ///
    /// Returns `Ok(None)` when no calendar is configured.
    pub async fn default_calendar(&self) -> Result<Option<Calendar>, CalDavError> {
        let Some(name) = self.calendar.as_deref() else {
            return Ok(None);
        };
        let principal = self.connect().principal().await?;
        principal.calendar(name).await.map(Some)
    }

    /// Get the password as a string reference
    #[must_use]
    pub fn password_str(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }

    /// Whether a username and password are both set
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password_str().is_some_and(|p| !p.is_empty())
    }
}
