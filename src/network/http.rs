use super::{BillsApi, FeedPayload};
use crate::config::Config;
use crate::model::BillId;
use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::{Host, Url};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_ACK_SIZE: usize = 64 * 1024;

/// Errors from talking to the bills API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Body was not the JSON we expected
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

impl FetchError {
    /// Transient errors worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::Network(_)
            | FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus(status) => *status == 429 || *status >= 500,
            FetchError::Parse(_)
            | FetchError::RateLimited(_)
            | FetchError::ResponseTooLarge
            | FetchError::InvalidUrl(_)
            | FetchError::InsecureBaseUrl => false,
        }
    }
}

#[derive(Serialize)]
struct LikeRequest {
    liked: bool,
}

/// [`BillsApi`] over HTTP/JSON.
///
/// - `GET {base}/feed` returns a [`FeedPayload`]
/// - `PUT {base}/bills/{number}/like` with `{"liked": bool}`
///
/// 429 and 5xx responses, timeouts and truncated bodies are retried with
/// exponential backoff (`backoff`, 2x, 4x, ...) up to `max_retries` times.
/// Other 4xx statuses fail immediately.
pub struct HttpBillsApi {
    client: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl std::fmt::Debug for HttpBillsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBillsApi")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl HttpBillsApi {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] if `base_url` does not parse
    /// - [`FetchError::InsecureBaseUrl`] for plain HTTP to anything but loopback
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, FetchError> {
        let base = validate_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?;

        Ok(Self {
            client,
            base,
            token: token.map(SecretString::from),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Ok(Self::new(&config.api_base_url, config.resolved_api_token())?
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .max_retries(config.max_retries))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry; doubles on each subsequent one.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send_with_retry<F>(&self, build: F, limit: usize) -> Result<Vec<u8>, FetchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry_count = 0;

        loop {
            match self.attempt(build(), limit).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retry_count < self.max_retries => {
                    let delay = self.backoff.saturating_mul(1u32 << retry_count.min(16));
                    tracing::warn!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient API error, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(FetchError::HttpStatus(429)) => {
                    return Err(FetchError::RateLimited(retry_count));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        request: reqwest::RequestBuilder,
        limit: usize,
    ) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.authorize(request).send())
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, limit).await
    }
}

#[async_trait]
impl BillsApi for HttpBillsApi {
    async fn fetch_feed(&self) -> Result<FeedPayload, FetchError> {
        let url = self.endpoint("feed")?;
        let bytes = self
            .send_with_retry(|| self.client.get(url.clone()), MAX_FEED_SIZE)
            .await?;

        let payload: FeedPayload =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        tracing::debug!(
            bills = payload.bills.len(),
            reps = payload.reps.as_ref().map(|r| r.len()),
            "Fetched feed"
        );
        Ok(payload)
    }

    async fn set_like(&self, bill: BillId, liked: bool) -> Result<(), FetchError> {
        let url = self.endpoint(&format!("bills/{}/like", bill))?;
        let body = serde_json::to_vec(&LikeRequest { liked })
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        self.send_with_retry(
            || {
                self.client
                    .put(url.clone())
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone())
            },
            MAX_ACK_SIZE,
        )
        .await?;
        tracing::debug!(bill = %bill, liked, "Like acknowledged");
        Ok(())
    }
}

/// Parse the base URL, require HTTPS except for loopback hosts, and make sure
/// the path ends in `/` so relative joins append instead of replacing.
fn validate_base_url(base_url: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(base_url)?;

    match url.scheme() {
        "https" => {}
        "http" if is_loopback(&url) => {
            tracing::warn!(base_url = %url, "Using non-HTTPS API base URL (localhost only)");
        }
        _ => {
            tracing::error!(base_url = %url, "Rejecting non-HTTPS base URL");
            return Err(FetchError::InsecureBaseUrl);
        }
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BillId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_JSON: &str = r#"{
        "bills": [
            {"metadata": {"number": 1001, "assembly": 101, "chamber": "House"}, "title": "Farm Act", "category": "Agriculture"},
            {"metadata": {"number": 1002}, "title": "Roads Act"}
        ]
    }"#;

    fn api(server: &MockServer) -> HttpBillsApi {
        HttpBillsApi::new(&server.uri(), None)
            .unwrap()
            .backoff(Duration::from_millis(1))
    }

    #[test]
    fn test_base_url_requires_https() {
        assert!(matches!(
            validate_base_url("http://bills.example.org"),
            Err(FetchError::InsecureBaseUrl)
        ));
        assert!(validate_base_url("https://bills.example.org").is_ok());
        assert!(validate_base_url("http://127.0.0.1:9000").is_ok());
        assert!(validate_base_url("http://localhost").is_ok());
        assert!(matches!(
            validate_base_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_base_url_path_gets_trailing_slash() {
        let url = validate_base_url("https://bills.example.org/api/v1").unwrap();
        assert_eq!(
            url.join("feed").unwrap().as_str(),
            "https://bills.example.org/api/v1/feed"
        );
    }

    #[test]
    fn test_debug_masks_token() {
        let api = HttpBillsApi::new("https://bills.example.org", Some("secret-abc".into())).unwrap();
        let out = format!("{:?}", api);
        assert!(!out.contains("secret-abc"));
        assert!(out.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_fetch_feed_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_JSON))
            .mount(&server)
            .await;

        let payload = api(&server).fetch_feed().await.unwrap();
        assert_eq!(payload.bills.len(), 2);
        assert_eq!(payload.bills[0].id(), BillId(1001));
        assert!(payload.reps.is_none());
    }

    #[tokio::test]
    async fn test_fetch_feed_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_JSON))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpBillsApi::new(&server.uri(), Some("tok-1".into())).unwrap();
        assert!(api.fetch_feed().await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_feed_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = api(&server).fetch_feed().await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let result = api(&server).fetch_feed().await;
        assert!(matches!(result, Err(FetchError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_server_error_retried_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = api(&server).max_retries(2).fetch_feed().await;
        assert!(matches!(result, Err(FetchError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_server_error_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_JSON))
            .mount(&server)
            .await;

        let payload = api(&server).fetch_feed().await.unwrap();
        assert_eq!(payload.bills.len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = api(&server).max_retries(1).fetch_feed().await;
        assert!(matches!(result, Err(FetchError::RateLimited(1))));
    }

    #[tokio::test]
    async fn test_set_like_puts_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/bills/1001/like"))
            .and(body_json(serde_json::json!({"liked": true})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).set_like(BillId(1001), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_like_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = api(&server).set_like(BillId(1), false).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(403))));
    }
}
