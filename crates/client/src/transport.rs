//! HTTP transport seam
//!
//! [`DavClient`](crate::DavClient) talks to the server only through
//! [`DavTransport`], so tests and embedders can swap the HTTP stack.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url, header};
use tracing::debug;

use crate::config::DavClientConfig;
use crate::error::CalDavError;

/// WebDAV/CalDAV request methods used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    Propfind,
    Proppatch,
    Report,
    Mkcalendar,
    Get,
    Put,
    Delete,
}

impl DavMethod {
    /// Method name on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Propfind => "PROPFIND",
            Self::Proppatch => "PROPPATCH",
            Self::Report => "REPORT",
            Self::Mkcalendar => "MKCALENDAR",
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method never changes server state
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Propfind | Self::Report | Self::Get)
    }
}

impl std::fmt::Display for DavMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Depth` header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

/// A single request to the server
#[derive(Debug, Clone)]
pub struct DavRequest {
    pub method: DavMethod,
    pub url: Url,
    pub depth: Option<Depth>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl DavRequest {
    /// Request without body or extra headers
    #[must_use]
    pub const fn new(method: DavMethod, url: Url) -> Self {
        Self {
            method,
            url,
            depth: None,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Set the `Depth` header
    #[must_use]
    pub const fn depth(mut self, depth: Depth) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach an XML body
    #[must_use]
    pub fn xml(self, body: String) -> Self {
        self.body(body, "application/xml; charset=utf-8")
    }

    /// Attach an iCalendar body
    #[must_use]
    pub fn calendar(self, body: String) -> Self {
        self.body(body, "text/calendar; charset=utf-8")
    }

    fn body(mut self, body: String, content_type: &str) -> Self {
        self.body = Some(body);
        self.header("Content-Type", content_type)
    }

    /// Value of a header set on this request
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, selected headers and body of a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub location: Option<String>,
    pub body: String,
}

impl RawResponse {
    /// Response with a status and body
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Self::default()
        }
    }

    /// Attach an ETag
    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends DAV requests
#[async_trait]
pub trait DavTransport: Send + Sync + std::fmt::Debug {
    /// Send a request and return the raw response, whatever its status
    async fn send(&self, request: DavRequest) -> Result<RawResponse, CalDavError>;
}

/// [`DavTransport`] over `reqwest` with HTTP basic authentication
pub struct HttpTransport {
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Build the HTTP client from `config`
    pub fn new(config: &DavClientConfig) -> Result<Self, CalDavError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_certs)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CalDavError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl DavTransport for HttpTransport {
    async fn send(&self, request: DavRequest) -> Result<RawResponse, CalDavError> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| CalDavError::InvalidInput(e.to_string()))?;

        let mut builder = self.client.request(method, request.url);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        if let Some(depth) = request.depth {
            builder = builder.header("Depth", depth.as_str());
        }
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let etag = header_string(response.headers(), &header::ETAG);
        let location = header_string(response.headers(), &header::LOCATION);
        let body = response.text().await?;

        debug!(status, body_length = body.len(), "Received DAV response");

        Ok(RawResponse {
            status,
            etag,
            location,
            body,
        })
    }
}

fn header_string(headers: &header::HeaderMap, name: &header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://dav.example.com/cal/").expect("valid url")
    }

    #[test]
    fn method_names() {
        assert_eq!(DavMethod::Propfind.as_str(), "PROPFIND");
        assert_eq!(DavMethod::Mkcalendar.to_string(), "MKCALENDAR");
        assert!(DavMethod::Report.is_read_only());
        assert!(DavMethod::Get.is_read_only());
        assert!(!DavMethod::Put.is_read_only());
        assert!(!DavMethod::Delete.is_read_only());
    }

    #[test]
    fn depth_values() {
        assert_eq!(Depth::Zero.as_str(), "0");
        assert_eq!(Depth::One.as_str(), "1");
        assert_eq!(Depth::Infinity.as_str(), "infinity");
    }

    #[test]
    fn request_builder_sets_content_type() {
        let request = DavRequest::new(DavMethod::Put, url())
            .calendar("BEGIN:VCALENDAR".to_string())
            .header("If-None-Match", "*");
        assert_eq!(
            request.header_value("content-type"),
            Some("text/calendar; charset=utf-8")
        );
        assert_eq!(request.header_value("If-None-Match"), Some("*"));
        assert!(request.depth.is_none());
    }

    #[test]
    fn xml_request_has_depth() {
        let request = DavRequest::new(DavMethod::Propfind, url())
            .depth(Depth::One)
            .xml("<D:propfind/>".to_string());
        assert_eq!(request.depth, Some(Depth::One));
        assert_eq!(
            request.header_value("Content-Type"),
            Some("application/xml; charset=utf-8")
        );
    }

    #[test]
    fn raw_response_success_range() {
        assert!(RawResponse::new(207, "").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(301, "").is_success());
        assert!(!RawResponse::new(404, "").is_success());
    }

    #[test]
    fn http_transport_debug_redacts_password() {
        let config = DavClientConfig::new("https://dav.example.com/").with_credentials("alice", "s3cret");
        let transport = HttpTransport::new(&config).expect("client builds");
        let debug = format!("{transport:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("s3cret"));
    }
}
