//! Request rate limiting
//!
//! Provides a `RateLimiter` that gates async operations so that no more than
//! `limit` of them start within any `interval`. The default of one request per
//! second follows the public Nominatim usage policy.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for request throttling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether requests are throttled at all
    pub enabled: bool,
    /// Number of request starts allowed per interval
    pub limit: u32,
    /// Length of the throttling window
    pub interval: Duration,
    /// Forbid carrying unused capacity from one window into the next
    pub strict: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 1,
            interval: Duration::from_millis(1000),
            strict: true,
        }
    }
}

/// Counters exposed by the rate limiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    /// Operations that completed successfully through the limiter
    pub request_count: u64,
    /// Operations currently waiting for a slot or in flight
    pub queued_count: u64,
}

/// Bookkeeping for when the next request may start
#[derive(Debug)]
enum ThrottleWindow {
    /// Start times of the most recent `limit` requests
    Sliding(VecDeque<Instant>),
    /// Fixed window beginning at `tick`, with `active` starts used so far
    Fixed { tick: Option<Instant>, active: u32 },
}

/// Throttles async operations to a configured rate
///
/// Concurrent callers reserve their start times one at a time under a single
/// lock, then wait outside the lock until their slot arrives.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: AtomicBool,
    limit: u32,
    interval: Duration,
    window: Mutex<ThrottleWindow>,
    request_count: AtomicU64,
    queued_count: AtomicU64,
}

/// Decrements the queued counter when an `execute` call settles or is dropped
struct QueuedGuard<'a>(&'a AtomicU64);

impl<'a> QueuedGuard<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        // The counter may have been reset while this call was in flight
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

impl RateLimiter {
    /// Creates a limiter from the given configuration
    ///
    /// A `limit` of zero is treated as one.
    pub fn new(config: &RateLimitConfig) -> Self {
        let window = if config.strict {
            ThrottleWindow::Sliding(VecDeque::new())
        } else {
            ThrottleWindow::Fixed {
                tick: None,
                active: 0,
            }
        };
        Self {
            enabled: AtomicBool::new(config.enabled),
            limit: config.limit.max(1),
            interval: config.interval,
            window: Mutex::new(window),
            request_count: AtomicU64::new(0),
            queued_count: AtomicU64::new(0),
        }
    }

    /// Runs `operation` once a throttling slot is available
    ///
    /// The operation's result is returned unchanged. Only successful
    /// operations count toward `request_count`. When the limiter is disabled
    /// the operation runs immediately.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_enabled() {
            return operation().await;
        }

        let _queued = QueuedGuard::enter(&self.queued_count);

        let start_at = self.reserve_slot().await;
        let now = Instant::now();
        if start_at > now {
            debug!(wait_ms = (start_at - now).as_millis() as u64, "rate limit: waiting for slot");
            tokio::time::sleep_until(start_at).await;
        }

        let result = operation().await;
        if result.is_ok() {
            self.request_count.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    /// Reserves the earliest permitted start time for one request
    async fn reserve_slot(&self) -> Instant {
        let mut window = self.window.lock().await;
        let now = Instant::now();

        match &mut *window {
            ThrottleWindow::Sliding(starts) => {
                let start_at = if starts.len() < self.limit as usize {
                    now
                } else {
                    match starts.pop_front() {
                        Some(oldest) => (oldest + self.interval).max(now),
                        None => now,
                    }
                };
                starts.push_back(start_at);
                start_at
            }
            ThrottleWindow::Fixed { tick, active } => match *tick {
                Some(current) if now.duration_since(current) <= self.interval => {
                    if *active < self.limit {
                        *active += 1;
                    } else {
                        let next = current + self.interval;
                        *tick = Some(next);
                        *active = 1;
                    }
                    tick.map_or(now, |t| t.max(now))
                }
                _ => {
                    *tick = Some(now);
                    *active = 1;
                    now
                }
            },
        }
    }

    /// Returns a snapshot of the limiter counters
    ///
    /// # Returns
    /// * `request_count` - operations that succeeded through the limiter
    /// * `queued_count` - operations waiting for a slot or still running
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            request_count: self.request_count.load(Ordering::SeqCst),
            queued_count: self.queued_count.load(Ordering::SeqCst),
        }
    }

    /// Resets both counters to zero
    ///
    /// Reserved start times are kept; see [`RateLimiter::reset`] to also
    /// forget them.
    pub fn reset_stats(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.queued_count.store(0, Ordering::SeqCst);
    }

    /// Returns the limiter to its freshly constructed state
    ///
    /// Clears the counters and the record of previous start times, so the
    /// next call starts immediately.
    pub async fn reset(&self) {
        let mut window = self.window.lock().await;
        match &mut *window {
            ThrottleWindow::Sliding(starts) => starts.clear(),
            ThrottleWindow::Fixed { tick, active } => {
                *tick = None;
                *active = 0;
            }
        }
        drop(window);
        self.reset_stats();
    }

    /// Whether calls are currently throttled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enables or disables throttling
    ///
    /// Disabling resets the counters. Calls already in flight keep running
    /// and still release their queued slot when they settle.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.reset_stats();
        }
    }
}
