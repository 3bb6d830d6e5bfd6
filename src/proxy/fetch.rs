//! Fetching pages through an egress proxy
//!
//! A fetch tries the proxy's native scheme first and the other scheme second.
//! Each scheme attempt is a single GET through a [`ProxyTransport`], bounded by
//! its own timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{RelayError, Result};
use crate::models::{ProxyEndpoint, ProxyScheme};

pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Options applied to each scheme attempt
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// 0 disables redirect following
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Raw response from a single transport attempt
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Response returned by a fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub status_text: String,
    /// Lowercased header names; repeated headers joined with ", "
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
    pub protocol_used: ProxyScheme,
}

impl FetchResponse {
    /// Status in the 200..=399 range
    pub fn is_success(&self) -> bool {
        (200..=399).contains(&self.status)
    }
}

/// One GET request through a proxy using a specific scheme
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    async fn get(
        &self,
        url: &Url,
        endpoint: &ProxyEndpoint,
        scheme: ProxyScheme,
        options: &FetchOptions,
    ) -> Result<TransportResponse>;
}

/// Fetch a page through a proxy
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        endpoint: &ProxyEndpoint,
        options: &FetchOptions,
    ) -> Result<FetchResponse>;
}

/// Flatten a header map into lowercase names with comma-joined values
pub fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut normalized = BTreeMap::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        normalized.insert(name.as_str().to_lowercase(), joined);
    }
    normalized
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

/// Transport built on reqwest, one client per attempt
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    fn client(
        endpoint: &ProxyEndpoint,
        scheme: ProxyScheme,
        options: &FetchOptions,
    ) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(endpoint.url(scheme))?;
        let redirect = if options.max_redirects == 0 {
            Policy::none()
        } else {
            Policy::limited(options.max_redirects)
        };

        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .redirect(redirect)
            .user_agent(options.user_agent.as_str())
            .default_headers(default_headers())
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl ProxyTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        endpoint: &ProxyEndpoint,
        scheme: ProxyScheme,
        options: &FetchOptions,
    ) -> Result<TransportResponse> {
        let client = Self::client(endpoint, scheme, options)?;
        let response = client.get(url.clone()).send().await?;

        let status = response.status();
        let headers = normalize_headers(response.headers());
        let body = response.text().await?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Native scheme first, other scheme on failure
pub struct DualProtocolFetcher<T = ReqwestTransport> {
    transport: T,
}

impl DualProtocolFetcher<ReqwestTransport> {
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport)
    }
}

impl Default for DualProtocolFetcher<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ProxyTransport> DualProtocolFetcher<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: ProxyTransport> Fetcher for DualProtocolFetcher<T> {
    #[instrument(skip_all, fields(proxy = %endpoint.id(), url = %url))]
    async fn fetch(
        &self,
        url: &Url,
        endpoint: &ProxyEndpoint,
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let start = Instant::now();
        let mut last_error = None;

        for scheme in endpoint.scheme.attempt_order() {
            debug!(%scheme, "Attempting request through proxy");

            let attempt = tokio::time::timeout(
                options.timeout,
                self.transport.get(url, endpoint, scheme, options),
            )
            .await;

            let failure = match attempt {
                Ok(Ok(response)) if response.status < 500 => {
                    return Ok(FetchResponse {
                        status: response.status,
                        status_text: response.status_text,
                        headers: response.headers,
                        body: response.body,
                        elapsed: start.elapsed(),
                        protocol_used: scheme,
                    });
                }
                Ok(Ok(response)) => RelayError::Fetch(format!(
                    "HTTP {}: {}",
                    response.status, response.status_text
                )),
                Ok(Err(e)) => e,
                Err(_) => RelayError::Timeout,
            };

            debug!(%scheme, error = %failure, "Request through proxy failed");
            last_error = Some(failure);
        }

        let message = match last_error {
            Some(RelayError::Fetch(message)) => message,
            Some(other) => other.to_string(),
            None => "no transport attempted".to_string(),
        };
        warn!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            error = %message,
            "Fetch failed on both schemes"
        );
        Err(RelayError::Fetch(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    enum Reply {
        Status(u16, &'static str),
        Error(&'static str),
        Hang,
    }

    struct ScriptedTransport {
        replies: HashMap<ProxyScheme, Reply>,
        calls: Mutex<Vec<ProxyScheme>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(ProxyScheme, Reply)>) -> Self {
            Self {
                replies: replies.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProxyTransport for ScriptedTransport {
        async fn get(
            &self,
            _url: &Url,
            _endpoint: &ProxyEndpoint,
            scheme: ProxyScheme,
            _options: &FetchOptions,
        ) -> Result<TransportResponse> {
            self.calls.lock().push(scheme);
            match &self.replies[&scheme] {
                Reply::Status(status, body) => Ok(TransportResponse {
                    status: *status,
                    status_text: "Scripted".to_string(),
                    headers: BTreeMap::new(),
                    body: body.to_string(),
                }),
                Reply::Error(message) => Err(RelayError::Fetch(message.to_string())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(RelayError::Fetch("unreachable".to_string()))
                }
            }
        }
    }

    fn target() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    fn http_proxy() -> ProxyEndpoint {
        ProxyEndpoint::new("10.0.0.1", 8080, ProxyScheme::Http)
    }

    #[tokio::test]
    async fn test_native_scheme_success_needs_one_attempt() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Status(200, "OK")),
            (ProxyScheme::Https, Reply::Status(200, "unused")),
        ]));

        let response = fetcher
            .fetch(&target(), &http_proxy(), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.body, "OK");
        assert_eq!(response.protocol_used, ProxyScheme::Http);
        assert_eq!(*fetcher.transport.calls.lock(), vec![ProxyScheme::Http]);
    }

    #[tokio::test]
    async fn test_http_failure_falls_back_to_https() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Error("connection refused")),
            (ProxyScheme::Https, Reply::Status(200, "secure")),
        ]));

        let response = fetcher
            .fetch(&target(), &http_proxy(), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.protocol_used, ProxyScheme::Https);
        assert_eq!(
            *fetcher.transport.calls.lock(),
            vec![ProxyScheme::Http, ProxyScheme::Https]
        );
    }

    #[tokio::test]
    async fn test_https_endpoint_tries_https_first() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Status(200, "plain")),
            (ProxyScheme::Https, Reply::Error("handshake failed")),
        ]));
        let endpoint = ProxyEndpoint::new("10.0.0.1", 443, ProxyScheme::Https);

        let response = fetcher
            .fetch(&target(), &endpoint, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.protocol_used, ProxyScheme::Http);
        assert_eq!(
            *fetcher.transport.calls.lock(),
            vec![ProxyScheme::Https, ProxyScheme::Http]
        );
    }

    #[tokio::test]
    async fn test_both_schemes_failing_raises_fetch_error() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Error("connection refused")),
            (ProxyScheme::Https, Reply::Error("connection reset")),
        ]));

        let err = fetcher
            .fetch(&target(), &http_proxy(), &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Fetch(ref m) if m == "connection reset"));
        assert_eq!(fetcher.transport.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_returned_as_data() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Status(404, "missing")),
            (ProxyScheme::Https, Reply::Status(200, "unused")),
        ]));

        let response = fetcher
            .fetch(&target(), &http_proxy(), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(fetcher.transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_trigger_fallback() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Status(503, "busy")),
            (ProxyScheme::Https, Reply::Status(502, "bad gateway")),
        ]));

        let err = fetcher
            .fetch(&target(), &http_proxy(), &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Fetch(ref m) if m.starts_with("HTTP 502")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_has_its_own_timeout() {
        let fetcher = DualProtocolFetcher::with_transport(ScriptedTransport::new(vec![
            (ProxyScheme::Http, Reply::Hang),
            (ProxyScheme::Https, Reply::Status(200, "late but fine")),
        ]));
        let options = FetchOptions {
            timeout: Duration::from_secs(2),
            ..FetchOptions::default()
        };

        let response = fetcher.fetch(&target(), &http_proxy(), &options).await.unwrap();

        assert_eq!(response.protocol_used, ProxyScheme::Https);
        assert!(response.elapsed >= Duration::from_secs(2));
        assert!(response.elapsed < Duration::from_secs(4));
    }

    #[test]
    fn test_normalize_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert("X-Custom", HeaderValue::from_static("yes"));

        let normalized = normalize_headers(&headers);

        assert_eq!(normalized.get("set-cookie").unwrap(), "a=1, b=2");
        assert_eq!(normalized.get("x-custom").unwrap(), "yes");
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_fetch_options_defaults() {
        let options = FetchOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.max_redirects, 5);
        assert!(options.user_agent.starts_with("Mozilla/5.0"));
    }
}
