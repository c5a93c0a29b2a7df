#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod clock;
mod error;
mod limiter;
pub mod storage;

use std::sync::Arc;

pub use clock::{Clock, SystemClock};
pub use error::RateLimitError;
pub use limiter::{RateLimiter, Reservation, Window, WindowCounts};
pub use storage::CounterStore;

use pictura_config::{RateLimitConfig, RateLimitStorage};

use crate::storage::{memory::MemoryCounterStore, redis::RedisCounterStore};

/// Create a counter store from configuration
pub fn create_counter_store(storage: &RateLimitStorage) -> Result<Arc<dyn CounterStore>, RateLimitError> {
    let store: Arc<dyn CounterStore> = match storage {
        RateLimitStorage::Memory => Arc::new(MemoryCounterStore::new()),
        RateLimitStorage::Redis(redis) => Arc::new(RedisCounterStore::new(redis)?),
    };

    Ok(store)
}

/// Create a rate limiter from configuration
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<RateLimiter, RateLimitError> {
    let store = create_counter_store(&config.storage)?;
    Ok(RateLimiter::new(config, store))
}
