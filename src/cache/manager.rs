//! In-memory response cache with TTL expiry and LRU eviction
//!
//! Provides a `CacheManager` keyed by endpoint plus normalized query
//! parameters, so identical requests share one entry regardless of the order
//! their parameters were added in.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;

use crate::params::QueryParams;

/// Configuration for the response cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether responses are cached at all
    pub enabled: bool,
    /// How long an entry stays fresh
    pub ttl: Duration,
    /// Maximum number of entries kept before LRU eviction
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_millis(300_000), // 5 minutes
            max_size: 500,
        }
    }
}

/// Hit/miss counters and current size of the cache
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Lookups that returned a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// `hits / (hits + misses)` rounded to two decimals, 0 before any lookup
    pub hit_rate: f64,
    /// Entries currently stored, expired ones included until touched
    pub size: usize,
}

/// A cached value together with its freshness window
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug)]
struct CacheState<V> {
    enabled: bool,
    entries: LruCache<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

impl<V> CacheState<V> {
    fn reset(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Bounded, TTL-based response cache
///
/// All operations are synchronous; the internal lock is never held across an
/// `.await`, so one instance can be shared between concurrent requests.
#[derive(Debug)]
pub struct CacheManager<V> {
    ttl: Duration,
    max_size: usize,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> CacheManager<V> {
    /// Creates a cache from the given configuration
    pub fn new(config: &CacheConfig) -> Self {
        // LruCache needs a non-zero capacity; a zero max_size never stores anything
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl: config.ttl,
            max_size: config.max_size,
            state: Mutex::new(CacheState {
                enabled: config.enabled,
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Derives the cache key for a request
    ///
    /// The endpoint and the parameters sorted by key are joined with `?`.
    pub fn cache_key(endpoint: &str, params: &QueryParams) -> String {
        format!("{}?{}", endpoint, params.to_sorted_query_string())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Looks up a fresh entry, counting a hit or a miss
    ///
    /// Returns `None` without touching the counters when caching is disabled.
    pub fn get(&self, endpoint: &str, params: &QueryParams) -> Option<V> {
        let key = Self::cache_key(endpoint, params);
        let mut state = self.lock();
        if !state.enabled {
            return None;
        }

        let now = Instant::now();
        let fresh = match state.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        };
        if fresh.is_none() {
            state.entries.pop(&key);
        }

        match fresh {
            Some(value) => {
                state.hits += 1;
                debug!(key = %key, "cache hit");
                Some(value)
            }
            None => {
                state.misses += 1;
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    /// Stores a value using the configured TTL
    pub fn set(&self, endpoint: &str, params: &QueryParams, value: V) {
        self.set_with_ttl(endpoint, params, value, self.ttl);
    }

    /// Stores a value with its own TTL, overwriting any previous entry
    pub fn set_with_ttl(&self, endpoint: &str, params: &QueryParams, value: V, ttl: Duration) {
        if self.max_size == 0 || ttl.is_zero() {
            return;
        }

        let key = Self::cache_key(endpoint, params);
        let mut state = self.lock();
        if !state.enabled {
            return;
        }

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
            if evicted != key {
                debug!(key = %evicted, "evicted least recently used cache entry");
            }
        }
    }

    /// Reports whether a fresh entry exists, without affecting counters or LRU order
    pub fn has(&self, endpoint: &str, params: &QueryParams) -> bool {
        let key = Self::cache_key(endpoint, params);
        let state = self.lock();
        if !state.enabled {
            return false;
        }
        state
            .entries
            .peek(&key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Removes every entry and resets the hit/miss counters
    pub fn clear(&self) {
        self.lock().reset();
    }

    /// Returns hit/miss counters and the current number of entries
    ///
    /// # Returns
    /// * `CacheStats` whose `hit_rate` is `hits / (hits + misses)` rounded to
    ///   two decimals, or `0.0` before the first lookup
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (state.hits as f64 / lookups as f64 * 100.0).round() / 100.0
        };
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            size: state.entries.len(),
        }
    }

    /// Whether lookups and stores are currently active
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Enables or disables the cache
    ///
    /// Disabling drops all entries and counters; re-enabling starts empty.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        state.enabled = enabled;
        if !enabled {
            state.reset();
        }
    }
}
