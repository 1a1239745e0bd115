//! Request orchestration
//!
//! `DataFetcher` is the single entry point for network calls. For every
//! request it applies, in order: cache lookup, rate limiting, the retry loop
//! around the HTTP GET, body parsing, and cache population.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::cache::{CacheConfig, CacheManager};
use crate::config::ClientConfig;
use crate::params::QueryParams;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::retry::{retry_with_backoff, JitterSource, RandomJitter, RetryConfig, RetryableError};
use crate::transport::{ReqwestTransport, Transport};

/// Identifies this client to the upstream service on every request
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors surfaced by [`DataFetcher::fetch`]
///
/// Errors carry the original status or message unchanged so callers can tell
/// rate limiting, server trouble, bad requests and network failures apart.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {status_text}")]
    Http { status: u16, status_text: String },

    /// No HTTP response was obtained
    #[error("Network error: {0}")]
    Network(String),

    /// The body was expected to be JSON but could not be parsed
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl FetchError {
    /// HTTP status code, if the error came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl RetryableError for FetchError {
    fn is_retryable(&self, retryable_status_codes: &HashSet<u16>) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Http { status, .. } => retryable_status_codes.contains(status),
            FetchError::Parse(_) | FetchError::ClientBuild(_) => false,
        }
    }
}

/// A parsed response body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// Body parsed as JSON (every format except `text` and `xml`)
    Json(Value),
    /// Raw body for `format=text` and `format=xml`
    Text(String),
}

impl ResponseBody {
    /// Returns the JSON value, or `None` for a text body
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// Returns the raw text, or `None` for a JSON body
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Json(_) => None,
            ResponseBody::Text(text) => Some(text),
        }
    }

    /// Renders the body for display: pretty-printed JSON or the raw text
    pub fn to_display_string(&self) -> String {
        match self {
            ResponseBody::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            ResponseBody::Text(text) => text.clone(),
        }
    }
}

/// Per-call overrides for the fetcher's resilience settings
///
/// * `cache`: `enabled = false` skips both lookup and store for this call;
///   `ttl` sets the lifetime of the stored entry. The cache size is fixed
///   when the fetcher is built.
/// * `rate_limit`: `enabled = false` bypasses the limiter for this call.
///   Limit and interval are fixed when the fetcher is built.
/// * `retry`: replaces the fetcher's retry configuration for this call.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub cache: Option<CacheConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub retry: Option<RetryConfig>,
}

/// Performs Nominatim requests with caching, rate limiting and retries
#[derive(Debug, Clone)]
pub struct DataFetcher {
    base_url: String,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheManager<ResponseBody>>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    jitter: Arc<dyn JitterSource>,
}

impl DataFetcher {
    /// Creates a fetcher that talks HTTP through `reqwest`
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config.timeout).map_err(FetchError::ClientBuild)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a fetcher using the given transport
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
            cache: Arc::new(CacheManager::new(&config.cache)),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            retry: config.retry.clone(),
            jitter: Arc::new(RandomJitter),
        }
    }

    /// Replaces the random source used for backoff jitter
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Server origin requests are sent to, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Response cache shared by every clone of this fetcher
    pub fn cache(&self) -> &CacheManager<ResponseBody> {
        &self.cache
    }

    /// Rate limiter shared by every clone of this fetcher
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Clears the cache and returns the rate limiter to its initial state
    ///
    /// Afterwards the fetcher behaves as if newly built: nothing is cached,
    /// counters are zero and the next request is not delayed by earlier ones.
    pub async fn reset(&self) {
        self.cache.clear();
        self.rate_limiter.reset().await;
    }

    /// Builds `base_url/endpoint?query`, leaving out the `?` when there are no parameters
    pub fn build_url(&self, endpoint: &str, params: &QueryParams) -> String {
        let mut url = format!("{}/{}", self.base_url, endpoint);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.to_query_string());
        }
        url
    }

    /// Fetches `endpoint` with the given parameters
    ///
    /// The body is returned as text when the `format` parameter is `text` or
    /// `xml`, and parsed as JSON otherwise.
    #[instrument(level = "debug", skip(self, params, options))]
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &QueryParams,
        options: &FetchOptions,
    ) -> Result<ResponseBody, FetchError> {
        let use_cache = options.cache.as_ref().map_or(true, |c| c.enabled);
        if use_cache {
            if let Some(cached) = self.cache.get(endpoint, params) {
                return Ok(cached);
            }
        }

        let url = self.build_url(endpoint, params);
        let url = url.as_str();
        let retry = options.retry.as_ref().unwrap_or(&self.retry);
        let jitter = self.jitter.as_ref();
        let send_with_retry = move || {
            retry_with_backoff(retry, jitter, move |attempt| self.send_once(url, attempt))
        };

        let use_rate_limit = options.rate_limit.as_ref().map_or(true, |c| c.enabled);
        let body = if use_rate_limit {
            self.rate_limiter.execute(send_with_retry).await?
        } else {
            send_with_retry().await?
        };

        let parsed = match params.get("format") {
            Some("text") | Some("xml") => ResponseBody::Text(body),
            _ => ResponseBody::Json(serde_json::from_str(&body)?),
        };

        if use_cache {
            match &options.cache {
                Some(cache_options) => {
                    self.cache
                        .set_with_ttl(endpoint, params, parsed.clone(), cache_options.ttl)
                }
                None => self.cache.set(endpoint, params, parsed.clone()),
            }
        }

        Ok(parsed)
    }

    /// One HTTP attempt; non-2xx statuses become `FetchError::Http`
    async fn send_once(&self, url: &str, attempt: u32) -> Result<String, FetchError> {
        debug!(url, attempt, "sending request");
        let response = self.transport.get(url, USER_AGENT).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(FetchError::Http {
                status: response.status,
                status_text: response.status_text,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::FixedJitter;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    fn create_test_fetcher(config: ClientConfig) -> (DataFetcher, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let fetcher = DataFetcher::with_transport(&config, transport.clone())
            .with_jitter(Arc::new(FixedJitter(0.5)));
        (fetcher, transport)
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs.iter().copied().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_requests_hit_the_cache() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json(r#"{"place_id":1}"#);
        let p = params(&[("q", "Paris"), ("format", "json")]);

        let first = fetcher.fetch("search", &p, &FetchOptions::default()).await.unwrap();
        let second = fetcher.fetch("search", &p, &FetchOptions::default()).await.unwrap();

        assert_eq!(first, ResponseBody::Json(json!({"place_id": 1})));
        assert_eq!(second, first);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(fetcher.rate_limiter().stats().request_count, 1);
        assert_eq!(fetcher.cache().stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_status_is_retried_until_success() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport
            .push_response(503, "Service Unavailable", "")
            .push_json(r#"{"place_id":42}"#);
        let options = FetchOptions {
            retry: Some(RetryConfig {
                enabled: true,
                max_attempts: 2,
                retryable_status_codes: [503].into_iter().collect(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let p = params(&[("lat", "51.5074"), ("lon", "-0.1278"), ("format", "json")]);

        let body = fetcher.fetch("reverse", &p, &options).await.unwrap();

        assert_eq!(body, ResponseBody::Json(json!({"place_id": 42})));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_format_returns_raw_body() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_response(200, "OK", "OK");

        let body = fetcher
            .fetch("status", &params(&[("format", "text")]), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(body, ResponseBody::Text("OK".to_string()));
        assert_eq!(body.as_text(), Some("OK"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_xml_format_returns_raw_body() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_response(200, "OK", "<searchresults/>");

        let body = fetcher
            .fetch("search", &params(&[("q", "Oslo"), ("format", "xml")]), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(body.as_text(), Some("<searchresults/>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_url_and_user_agent() {
        let config = ClientConfig {
            base_url: "http://localhost:7070/".to_string(),
            ..Default::default()
        };
        let (fetcher, transport) = create_test_fetcher(config);
        transport.push_json("[]");

        fetcher
            .fetch(
                "search",
                &params(&[("q", "Rue de Rivoli"), ("format", "jsonv2")]),
                &FetchOptions::default(),
            )
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "http://localhost:7070/search?q=Rue+de+Rivoli&format=jsonv2"
        );
        assert_eq!(requests[0].user_agent, USER_AGENT);
        assert!(USER_AGENT.starts_with("nominatim-cli/"));
    }

    #[test]
    fn test_build_url_without_params() {
        let (fetcher, _) = create_test_fetcher(ClientConfig::default());
        assert_eq!(
            fetcher.build_url("status", &QueryParams::new()),
            "https://nominatim.openstreetmap.org/status"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_fails_after_one_attempt() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport
            .push_response(400, "Bad Request", "")
            .push_json("[]");

        let err = fetcher
            .fetch("search", &params(&[("format", "json")]), &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            FetchError::Http { status: 400, status_text } if status_text == "Bad Request"
        ));
        assert_eq!(err.status(), Some(400));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(fetcher.rate_limiter().stats().request_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error_unchanged() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport
            .push_network_error("connection refused")
            .push_network_error("connection refused")
            .push_network_error("connection refused");

        let err = fetcher
            .fetch("search", &params(&[("q", "Nowhere")]), &FetchOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Network error: connection refused");
        assert_eq!(transport.call_count(), 3);
        assert!(!fetcher.cache().has("search", &params(&[("q", "Nowhere")])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_status_exhausts_attempts() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        for _ in 0..3 {
            transport.push_response(429, "Too Many Requests", "");
        }

        let err = fetcher
            .fetch("search", &params(&[("q", "Busy")]), &FetchOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_json_is_not_retried() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json("{not json").push_json("{}");

        let err = fetcher
            .fetch("search", &params(&[("q", "Paris"), ("format", "json")]), &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(fetcher.cache().stats().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_disabled_makes_single_attempt() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_response(503, "Service Unavailable", "").push_json("{}");
        let options = FetchOptions {
            retry: Some(RetryConfig::disabled()),
            ..Default::default()
        };

        let err = fetcher
            .fetch("status", &params(&[("format", "json")]), &options)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_can_be_skipped_per_call() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json(r#"{"a":1}"#).push_json(r#"{"a":2}"#);
        let options = FetchOptions {
            cache: Some(CacheConfig {
                enabled: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        let p = params(&[("q", "Paris")]);

        fetcher.fetch("search", &p, &options).await.unwrap();
        let second = fetcher.fetch("search", &p, &options).await.unwrap();

        assert_eq!(second, ResponseBody::Json(json!({"a": 2})));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(fetcher.cache().stats().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_cache_ttl_is_applied() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json("1").push_json("2");
        let options = FetchOptions {
            cache: Some(CacheConfig {
                ttl: std::time::Duration::from_millis(500),
                ..Default::default()
            }),
            ..Default::default()
        };
        let p = params(&[("q", "Paris")]);

        fetcher.fetch("search", &p, &options).await.unwrap();
        tokio::time::advance(std::time::Duration::from_millis(600)).await;
        let second = fetcher.fetch("search", &p, &options).await.unwrap();

        assert_eq!(second, ResponseBody::Json(json!(2)));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_can_be_bypassed_per_call() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json("{}").push_json("{}");
        let options = FetchOptions {
            rate_limit: Some(RateLimitConfig {
                enabled: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        let start = tokio::time::Instant::now();

        fetcher.fetch("search", &params(&[("q", "a")]), &options).await.unwrap();
        fetcher.fetch("search", &params(&[("q", "b")]), &options).await.unwrap();

        assert!(start.elapsed() < std::time::Duration::from_millis(1000));
        assert_eq!(fetcher.rate_limiter().stats().request_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_requests_are_spaced_by_rate_limiter() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json("{}").push_json("{}");
        let start = tokio::time::Instant::now();

        fetcher.fetch("search", &params(&[("q", "a")]), &FetchOptions::default()).await.unwrap();
        fetcher.fetch("search", &params(&[("q", "b")]), &FetchOptions::default()).await.unwrap();

        assert!(start.elapsed() >= std::time::Duration::from_millis(1000));
        assert_eq!(fetcher.rate_limiter().stats().request_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_cache_and_limiter_stats() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json("{}");
        let p = params(&[("q", "Paris")]);
        fetcher.fetch("search", &p, &FetchOptions::default()).await.unwrap();

        fetcher.reset().await;

        assert_eq!(fetcher.cache().stats().size, 0);
        assert_eq!(fetcher.rate_limiter().stats().request_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_does_not_throttle_next_request() {
        let (fetcher, transport) = create_test_fetcher(ClientConfig::default());
        transport.push_json("{}").push_json("{}");
        fetcher.fetch("search", &params(&[("q", "a")]), &FetchOptions::default()).await.unwrap();

        fetcher.reset().await;
        let start = tokio::time::Instant::now();
        fetcher.fetch("search", &params(&[("q", "b")]), &FetchOptions::default()).await.unwrap();

        assert!(start.elapsed() < std::time::Duration::from_millis(1000));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(fetcher.rate_limiter().stats().request_count, 1);
    }

    #[test]
    fn test_fetch_error_retry_classification() {
        let codes: HashSet<u16> = [429, 503].into_iter().collect();

        assert!(FetchError::Network("timeout".to_string()).is_retryable(&codes));
        assert!(FetchError::Http {
            status: 503,
            status_text: "Service Unavailable".to_string()
        }
        .is_retryable(&codes));
        assert!(!FetchError::Http {
            status: 404,
            status_text: "Not Found".to_string()
        }
        .is_retryable(&codes));
        let parse = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(!FetchError::Parse(parse).is_retryable(&codes));
    }

    #[test]
    fn test_response_body_display() {
        let json = ResponseBody::Json(json!({"a": 1}));
        assert_eq!(json.to_display_string(), "{\n  \"a\": 1\n}");
        assert!(json.as_json().is_some());
        assert!(json.as_text().is_none());

        let text = ResponseBody::Text("OK".to_string());
        assert_eq!(text.to_display_string(), "OK");
    }
}
