pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::RateLimitError;

/// Shared counters keyed by window
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value of a counter, zero when absent or expired
    async fn get(&self, key: &str) -> Result<u64, RateLimitError>;

    /// Atomically add one and (re)assert the expiry, returning the new value
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError>;

    /// Atomically add one only while the counter is below `limit`
    ///
    /// Returns the new value, or `None` when the counter is already full.
    async fn increment_within(&self, key: &str, ttl: Duration, limit: u64) -> Result<Option<u64>, RateLimitError>;

    /// Take one back from a live counter; never goes below zero
    async fn decrement(&self, key: &str) -> Result<(), RateLimitError>;
}
