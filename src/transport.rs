//! HTTP transport
//!
//! The fetcher talks to the network only through the `Transport` trait. The
//! production implementation wraps a `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;

use crate::fetch::FetchError;

/// Status line and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl RawResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single HTTP GET
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Sends a GET request to `url` with the given `User-Agent`
    ///
    /// Non-2xx responses are returned as `Ok`; only transport failures
    /// (DNS, connection, timeout, body read) become `FetchError::Network`.
    async fn get(&self, url: &str, user_agent: &str) -> Result<RawResponse, FetchError>;
}

/// Transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, user_agent: &str) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(RawResponse {
            status: status.as_u16(),
            status_text,
            body,
        })
    }
}
