//! Client configuration
//!
//! `ClientConfig` bundles the upstream base URL, the HTTP timeout and the
//! cache, rate limit and retry settings. Defaults follow the public Nominatim
//! usage policy; environment variables can override them.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::cache::CacheConfig;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryConfig;

/// Public Nominatim instance operated by the OpenStreetMap Foundation
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Default HTTP request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while assembling a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    /// The base URL is not an absolute http(s) URL
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Configuration for a Nominatim client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Origin of the Nominatim service, without a trailing path
    pub base_url: String,
    /// Timeout for a single HTTP attempt
    pub timeout: Duration,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Builds a configuration from defaults plus `NOMINATIM_*` environment variables
    ///
    /// Recognized variables:
    /// * `NOMINATIM_BASE_URL`
    /// * `NOMINATIM_CACHE_TTL_MS`
    /// * `NOMINATIM_CACHE_MAX_SIZE`
    /// * `NOMINATIM_RATE_LIMIT`
    /// * `NOMINATIM_RATE_INTERVAL_MS`
    /// * `NOMINATIM_MAX_ATTEMPTS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("NOMINATIM_BASE_URL") {
            config.base_url = url;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "NOMINATIM_CACHE_TTL_MS")? {
            config.cache.ttl = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<usize>(&lookup, "NOMINATIM_CACHE_MAX_SIZE")? {
            config.cache.max_size = size;
        }
        if let Some(limit) = parse_var::<u32>(&lookup, "NOMINATIM_RATE_LIMIT")? {
            config.rate_limit.limit = limit;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "NOMINATIM_RATE_INTERVAL_MS")? {
            config.rate_limit.interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "NOMINATIM_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the base URL is an absolute http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "https://nominatim.openstreetmap.org");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.retry, RetryConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_without_variables_matches_default() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_from_lookup_applies_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("NOMINATIM_BASE_URL", "http://localhost:8080"),
            ("NOMINATIM_CACHE_TTL_MS", "1500"),
            ("NOMINATIM_CACHE_MAX_SIZE", "20"),
            ("NOMINATIM_RATE_LIMIT", "5"),
            ("NOMINATIM_RATE_INTERVAL_MS", "2000"),
            ("NOMINATIM_MAX_ATTEMPTS", " 7 "),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.cache.ttl, Duration::from_millis(1500));
        assert_eq!(config.cache.max_size, 20);
        assert_eq!(config.rate_limit.limit, 5);
        assert_eq!(config.rate_limit.interval, Duration::from_millis(2000));
        assert_eq!(config.retry.max_attempts, 7);
    }

    #[test]
    fn test_invalid_number_is_reported_with_variable_name() {
        let err = ClientConfig::from_lookup(lookup_from(&[("NOMINATIM_RATE_LIMIT", "fast")]))
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("NOMINATIM_RATE_LIMIT"));
        assert!(message.contains("fast"));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("NOMINATIM_BASE_URL", "not a url")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));

        let err = ClientConfig::from_lookup(lookup_from(&[("NOMINATIM_BASE_URL", "ftp://example.org")]))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }
}
