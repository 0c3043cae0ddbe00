//! Client configuration

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Default `User-Agent` header
pub const DEFAULT_USER_AGENT: &str = concat!("caldav-rs/", env!("CARGO_PKG_VERSION"));

/// Connection settings for a [`DavClient`](crate::DavClient)
///
/// Every field is optional in the sense that a client can always be built
/// from it; a missing or malformed URL only surfaces on the first request.
#[derive(Clone, Serialize, Deserialize)]
pub struct DavClientConfig {
    /// Server or principal URL (e.g., <https://dav.example.com/dav.php/>)
    #[serde(default)]
    pub url: Option<String>,
    /// Username for HTTP basic authentication
    #[serde(default)]
    pub username: Option<String>,
    /// Password (excluded from serialization to prevent leaks)
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Verify TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub verify_certs: bool,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Retry policy for read-only requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl std::fmt::Debug for DavClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DavClientConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("verify_certs", &self.verify_certs)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish()
    }
}

const fn default_true() -> bool {
    true
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for DavClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            verify_certs: default_true(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }
}

impl DavClientConfig {
    /// Configuration pointing at `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set basic-auth credentials
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Accept self-signed or otherwise invalid certificates
    #[must_use]
    pub const fn danger_accept_invalid_certs(mut self) -> Self {
        self.verify_certs = false;
        self
    }
}
