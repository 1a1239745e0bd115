//! Retry with exponential backoff
//!
//! `retry_with_backoff` re-runs a failing async operation, sleeping between
//! attempts with an exponentially growing delay. Whether an error is worth
//! another attempt is decided by the error itself through `RetryableError`.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Status codes retried by default: timeouts, rate limiting and gateway/server failures
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Configuration for the retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Whether failed attempts are retried at all
    pub enabled: bool,
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    pub backoff_multiplier: f64,
    /// Randomize delays to spread out retries from many clients
    pub use_jitter: bool,
    /// HTTP status codes that warrant another attempt
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            use_jitter: true,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryConfig {
    /// A configuration that performs exactly one attempt
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Number of attempts the loop will make, never less than one
    pub fn effective_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Computes the delay to wait after the given failed attempt (1-based)
    ///
    /// The base delay is `initial_delay * backoff_multiplier^(attempt - 1)`,
    /// capped at `max_delay`. With jitter enabled it is scaled by a factor in
    /// `[0.5, 1.5)` and capped again.
    pub fn backoff_delay(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let mut delay = base.min(max).max(0.0);

        if self.use_jitter {
            let factor = 0.5 + jitter.sample().clamp(0.0, 1.0);
            delay = (delay * factor).min(max);
        }

        // f64 rounding can push a delay near Duration::MAX out of range
        Duration::try_from_secs_f64(delay).map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Source of randomness for backoff jitter
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// Returns a value in `[0, 1)`
    fn sample(&self) -> f64;
}

/// Jitter drawn from the thread-local random number generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Jitter that always returns the same sample, for reproducible delays
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Classifies errors for the retry loop
pub trait RetryableError {
    /// Whether another attempt could succeed, given the retryable status codes
    fn is_retryable(&self, retryable_status_codes: &HashSet<u16>) -> bool;
}

/// Runs `operation` until it succeeds, fails fatally, or attempts run out
///
/// The closure receives the 1-based attempt number. The error from the final
/// attempt, or from the first non-retryable failure, is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    jitter: &dyn JitterSource,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + fmt::Display,
{
    let max_attempts = config.effective_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !err.is_retryable(&config.retryable_status_codes) {
                    return Err(err);
                }

                let delay = config.backoff_delay(attempt, jitter);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
