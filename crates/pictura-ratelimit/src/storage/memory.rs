use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::CounterStore;
use crate::RateLimitError;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local counter store backed by dashmap
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked counters, live or not yet pruned
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn prune(&self, now: Instant) {
        self.counters.retain(|_, counter| counter.is_live(now));
    }

    /// Add one under the entry lock unless the count has reached `limit`
    fn bump(&self, key: &str, ttl: Duration, limit: u64) -> Option<u64> {
        let now = Instant::now();

        if !self.counters.contains_key(key) {
            self.prune(now);
        }

        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: now + ttl,
        });

        if !entry.is_live(now) {
            entry.count = 0;
        }

        if entry.count >= limit {
            return None;
        }

        entry.count += 1;
        entry.expires_at = now + ttl;

        Some(entry.count)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<u64, RateLimitError> {
        let now = Instant::now();

        Ok(self
            .counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .map_or(0, |counter| counter.count))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError> {
        Ok(self.bump(key, ttl, u64::MAX).unwrap_or(u64::MAX))
    }

    async fn increment_within(&self, key: &str, ttl: Duration, limit: u64) -> Result<Option<u64>, RateLimitError> {
        Ok(self.bump(key, ttl, limit))
    }

    async fn decrement(&self, key: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();

        if let Some(mut counter) = self.counters.get_mut(key).filter(|counter| counter.is_live(now)) {
            counter.count = counter.count.saturating_sub(1);
        }

        Ok(())
    }
}
