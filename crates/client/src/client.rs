//! CalDAV session
//!
//! [`DavClient`] holds the server URL, credentials and transport. Building
//! one never fails: a missing URL or an HTTP client error is remembered and
//! reported by the first request instead.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, instrument};

use crate::calendar::Calendar;
use crate::config::DavClientConfig;
use crate::error::CalDavError;
use crate::principal::Principal;
use crate::retry::{RetryConfig, retry};
use crate::transport::{DavMethod, DavRequest, DavTransport, Depth, HttpTransport, RawResponse};
use crate::xml::{self, DavProp, DavResponse};

/// Connection to a CalDAV server
///
/// Cloning is cheap; clones share the same transport.
#[derive(Debug, Clone)]
pub struct DavClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    url: Result<Url, String>,
    transport: Result<Arc<dyn DavTransport>, String>,
    retry: RetryConfig,
}

impl DavClient {
    /// Create a client from `config`
    pub fn new(config: DavClientConfig) -> Self {
        let transport = HttpTransport::new(&config)
            .map(|t| Arc::new(t) as Arc<dyn DavTransport>)
            .map_err(|e| e.to_string());
        Self::build(&config, transport)
    }

    /// Create a client from optional URL and credentials
    pub fn connect(url: Option<&str>, username: Option<&str>, password: Option<&str>) -> Self {
        let config = DavClientConfig {
            url: url.map(str::to_string),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            ..DavClientConfig::default()
        };
        Self::new(config)
    }

    /// Create a client that sends requests through `transport`
    pub fn with_transport(config: DavClientConfig, transport: Arc<dyn DavTransport>) -> Self {
        Self::build(&config, Ok(transport))
    }

    fn build(config: &DavClientConfig, transport: Result<Arc<dyn DavTransport>, String>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                url: parse_base_url(config.url.as_deref()),
                transport,
                retry: config.retry.clone(),
            }),
        }
    }

    /// The server URL given at construction
    pub fn url(&self) -> Result<&Url, CalDavError> {
        self.inner
            .url
            .as_ref()
            .map_err(|e| CalDavError::InvalidUrl(e.clone()))
    }

    /// Resolve an href from a response against the server URL
    pub fn resolve(&self, href: &str) -> Result<Url, CalDavError> {
        self.url()?
            .join(href)
            .map_err(|e| CalDavError::InvalidUrl(format!("{href}: {e}")))
    }

    fn transport(&self) -> Result<Arc<dyn DavTransport>, CalDavError> {
        self.inner
            .transport
            .as_ref()
            .map(Arc::clone)
            .map_err(|e| CalDavError::ConnectionFailed(e.clone()))
    }

    /// Discover the principal of the authenticated user
    ///
    /// Asks the server URL for `current-user-principal`; servers that do not
    /// report one get the server URL itself as principal.
    #[instrument(skip(self))]
    pub async fn principal(&self) -> Result<Principal, CalDavError> {
        let base = self.url()?.clone();
        let responses = self
            .propfind(&base, Depth::Zero, &[DavProp::CurrentUserPrincipal])
            .await?;

        let url = match responses
            .iter()
            .find_map(|r| r.props.current_user_principal.as_deref())
        {
            Some(href) => self.resolve(href)?,
            None => {
                debug!("Server reported no current-user-principal, using base URL");
                base
            },
        };
        Ok(Principal::new(self.clone(), url))
    }

    /// Principal handle for a known URL (no request is made)
    pub fn principal_at(&self, url: &str) -> Result<Principal, CalDavError> {
        Ok(Principal::new(self.clone(), self.resolve(url)?))
    }

    /// Calendar handle for a known collection URL (no request is made)
    pub fn calendar_at(&self, url: &str) -> Result<Calendar, CalDavError> {
        Ok(Calendar::existing(self.clone(), collection_url(self.resolve(url)?)))
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Send a request and map non-2xx statuses to errors
    ///
    /// Read-only requests are retried on transient failures.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub(crate) async fn send(&self, request: DavRequest) -> Result<RawResponse, CalDavError> {
        let transport = self.transport()?;

        if request.method.is_read_only() {
            retry(&self.inner.retry, || {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move {
                    let url = request.url.to_string();
                    check_status(transport.send(request).await?, &url)
                }
            })
            .await
        } else {
            let url = request.url.to_string();
            check_status(transport.send(request).await?, &url)
        }
    }

    pub(crate) async fn propfind(
        &self,
        url: &Url,
        depth: Depth,
        props: &[DavProp],
    ) -> Result<Vec<DavResponse>, CalDavError> {
        let request = DavRequest::new(DavMethod::Propfind, url.clone())
            .depth(depth)
            .xml(xml::propfind_body(props));
        let response = self.send(request).await?;
        debug!(body_length = response.body.len(), "Received PROPFIND response");
        xml::parse_multistatus(&response.body)
    }

    pub(crate) async fn report(
        &self,
        url: &Url,
        depth: Depth,
        body: String,
    ) -> Result<Vec<DavResponse>, CalDavError> {
        let request = DavRequest::new(DavMethod::Report, url.clone())
            .depth(depth)
            .xml(body);
        let response = self.send(request).await?;
        debug!(body_length = response.body.len(), "Received REPORT response");
        xml::parse_multistatus(&response.body)
    }

    pub(crate) async fn proppatch(&self, url: &Url, body: String) -> Result<(), CalDavError> {
        let request = DavRequest::new(DavMethod::Proppatch, url.clone()).xml(body);
        self.send(request).await.map(|_| ())
    }

    pub(crate) async fn mkcalendar(&self, url: &Url, body: String) -> Result<(), CalDavError> {
        let request = DavRequest::new(DavMethod::Mkcalendar, url.clone()).xml(body);
        self.send(request).await.map(|_| ())
    }

    pub(crate) async fn get(&self, url: &Url) -> Result<RawResponse, CalDavError> {
        let request = DavRequest::new(DavMethod::Get, url.clone()).header("Accept", "text/calendar");
        self.send(request).await
    }

    pub(crate) async fn put(
        &self,
        url: &Url,
        body: String,
        conditions: Vec<(&'static str, String)>,
    ) -> Result<RawResponse, CalDavError> {
        let mut request = DavRequest::new(DavMethod::Put, url.clone()).calendar(body);
        for (name, value) in conditions {
            request = request.header(name, value);
        }
        self.send(request).await
    }

    pub(crate) async fn delete(&self, url: &Url, etag: Option<&str>) -> Result<(), CalDavError> {
        let mut request = DavRequest::new(DavMethod::Delete, url.clone());
        if let Some(etag) = etag {
            request = request.header("If-Match", etag);
        }
        self.send(request).await.map(|_| ())
    }
}

fn check_status(response: RawResponse, url: &str) -> Result<RawResponse, CalDavError> {
    if response.is_success() {
        return Ok(response);
    }
    Err(CalDavError::from_status(response.status, url, &response.body))
}

fn parse_base_url(url: Option<&str>) -> Result<Url, String> {
    let raw = url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "no server URL configured".to_string())?;
    let url = Url::parse(raw).map_err(|e| format!("{raw}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{raw}: unsupported scheme '{}'", url.scheme()));
    }
    Ok(collection_url(url))
}

/// Collection URLs always end in `/` so relative hrefs join below them
pub(crate) fn collection_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses and records requests
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Mutex<Vec<Result<RawResponse, CalDavError>>>,
        requests: Mutex<Vec<DavRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<RawResponse, CalDavError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<DavRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl DavTransport for ScriptedTransport {
        async fn send(&self, request: DavRequest) -> Result<RawResponse, CalDavError> {
            self.requests.lock().expect("lock").push(request);
            self.responses
                .lock()
                .expect("lock")
                .pop()
                .unwrap_or_else(|| Ok(RawResponse::new(500, "script exhausted")))
        }
    }

    fn config() -> DavClientConfig {
        DavClientConfig::new("https://dav.example.com/dav")
            .with_retry(RetryConfig::new(1, 2, 2.0, 2).without_jitter())
    }

    const PRINCIPAL: &str = r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>/dav/</D:href>
<D:propstat><D:prop><D:current-user-principal><D:href>/dav/principals/alice/</D:href></D:current-user-principal></D:prop>
<D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>"#;

    #[test]
    fn construction_never_fails() {
        let client = DavClient::connect(None, None, None);
        assert!(matches!(client.url(), Err(CalDavError::InvalidUrl(_))));

        let client = DavClient::connect(Some("not a url"), Some("u"), Some("p"));
        assert!(matches!(client.url(), Err(CalDavError::InvalidUrl(_))));

        let client = DavClient::connect(Some("ftp://dav.example.com/"), None, None);
        assert!(matches!(client.url(), Err(CalDavError::InvalidUrl(_))));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = DavClient::new(config());
        assert_eq!(
            client.url().map(Url::as_str).ok(),
            Some("https://dav.example.com/dav/")
        );
        assert_eq!(
            client.resolve("calendars/").map(String::from).ok(),
            Some("https://dav.example.com/dav/calendars/".to_string())
        );
        assert_eq!(
            client.resolve("/other/").map(String::from).ok(),
            Some("https://dav.example.com/other/".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_url_surfaces_on_first_request() {
        let client = DavClient::connect(None, None, None);
        assert!(matches!(
            client.principal().await,
            Err(CalDavError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn principal_follows_current_user_principal() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(207, PRINCIPAL))]);
        let client = DavClient::with_transport(config(), transport.clone());

        let principal = client.principal().await.expect("principal");
        assert_eq!(
            principal.url().as_str(),
            "https://dav.example.com/dav/principals/alice/"
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, DavMethod::Propfind);
        assert_eq!(requests[0].depth, Some(Depth::Zero));
        assert!(
            requests[0]
                .body
                .as_deref()
                .is_some_and(|b| b.contains("current-user-principal"))
        );
    }

    #[tokio::test]
    async fn principal_falls_back_to_base_url() {
        let body = r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>/dav/</D:href>
<D:propstat><D:prop><D:current-user-principal/></D:prop><D:status>HTTP/1.1 404 Not Found</D:status></D:propstat>
</D:response></D:multistatus>"#;
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(207, body))]);
        let client = DavClient::with_transport(config(), transport);

        let principal = client.principal().await.expect("principal");
        assert_eq!(principal.url().as_str(), "https://dav.example.com/dav/");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(401, ""))]);
        let client = DavClient::with_transport(config(), transport.clone());

        assert!(matches!(
            client.principal().await,
            Err(CalDavError::AuthenticationFailed)
        ));
        assert_eq!(transport.requests().len(), 1, "401 must not be retried");
    }

    #[tokio::test]
    async fn read_requests_retry_server_errors() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawResponse::new(503, "busy")),
            Err(CalDavError::Timeout),
            Ok(RawResponse::new(207, PRINCIPAL)),
        ]);
        let client = DavClient::with_transport(config(), transport.clone());

        assert!(client.principal().await.is_ok());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn writes_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(503, "busy"))]);
        let client = DavClient::with_transport(config(), transport.clone());
        let url = client.resolve("cal/a.ics").expect("url");

        let result = client.put(&url, "BEGIN:VCALENDAR".to_string(), Vec::new()).await;
        assert!(matches!(
            result,
            Err(CalDavError::RequestFailed { status: 503, .. })
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn delete_sends_if_match() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(204, ""))]);
        let client = DavClient::with_transport(config(), transport.clone());
        let url = client.resolve("cal/a.ics").expect("url");

        client.delete(&url, Some("\"e1\"")).await.expect("delete");
        assert_eq!(transport.requests()[0].header_value("If-Match"), Some("\"e1\""));
    }

    #[test]
    fn handles_without_io() {
        let client = DavClient::new(config());
        let principal = client.principal_at("principals/bob/").expect("principal");
        assert_eq!(
            principal.url().as_str(),
            "https://dav.example.com/dav/principals/bob/"
        );
        let calendar = client.calendar_at("calendars/bob/work").expect("calendar");
        assert_eq!(
            calendar.url().as_str(),
            "https://dav.example.com/dav/calendars/bob/work/"
        );
        assert!(calendar.is_persisted());
    }
}
