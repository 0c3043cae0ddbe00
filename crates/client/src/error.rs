//! CalDAV client errors

use caldav_domain::DomainError;
use thiserror::Error;

use crate::retry::Retryable;

/// CalDAV client errors
#[derive(Debug, Error)]
pub enum CalDavError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The server refused a conditional request (stale ETag, existing or
    /// missing resource)
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request timed out")]
    Timeout,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CalDavError {
    /// Whether repeating the same request may succeed
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout => true,
            Self::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-2xx HTTP status to an error
    pub(crate) fn from_status(status: u16, resource: &str, body: &str) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed,
            404 | 410 => Self::NotFound(resource.to_string()),
            412 => Self::Consistency(format!("precondition failed for {resource}")),
            _ => Self::RequestFailed {
                status,
                message: summarize_body(body),
            },
        }
    }
}

impl Retryable for CalDavError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

impl From<reqwest::Error> for CalDavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        Self::ConnectionFailed(e.to_string())
    }
}
