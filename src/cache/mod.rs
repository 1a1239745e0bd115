//! Cache module for memoizing API responses in memory
//!
//! This module provides a cache manager that keeps parsed responses for a
//! configurable TTL, bounded by a maximum entry count with least-recently-used
//! eviction. Nothing is persisted; a fresh process always starts empty.

mod manager;

pub use manager::{CacheConfig, CacheManager, CacheStats};
