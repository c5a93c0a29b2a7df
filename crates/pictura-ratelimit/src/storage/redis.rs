use std::time::Duration;

use async_trait::async_trait;
use pictura_config::RedisConfig;
use redis::{AsyncCommands, aio::MultiplexedConnection};

use super::CounterStore;
use crate::RateLimitError;

// Increments only while under the limit; -1 when full
const INCREMENT_WITHIN: &str = r"
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
if count >= tonumber(ARGV[1]) then
    return -1
end
count = redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[2])
return count
";

const DECREMENT: &str = r"
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
if count > 0 then
    redis.call('DECR', KEYS[1])
end
return 0
";

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

/// Counter store shared across processes through Redis
#[derive(Clone)]
pub struct RedisCounterStore {
    client: redis::Client,
    key_prefix: String,
    connect_timeout: Duration,
}

impl RedisCounterStore {
    pub fn new(config: &RedisConfig) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| RateLimitError::Redis(format!("invalid Redis URL: {e}")))?;

        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout),
        })
    }

    fn key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.key_prefix)
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, RateLimitError> {
        tokio::time::timeout(self.connect_timeout, self.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| RateLimitError::Redis("timed out connecting to Redis".to_string()))?
            .map_err(|e| RateLimitError::Redis(format!("failed to get connection: {e}")))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<u64, RateLimitError> {
        let mut conn = self.connection().await?;

        let count: Option<u64> = conn
            .get(self.key(key))
            .await
            .map_err(|e| RateLimitError::Redis(format!("GET failed: {e}")))?;

        Ok(count.unwrap_or(0))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError> {
        let mut conn = self.connection().await?;
        let key = self.key(key);
        let ttl = ttl_secs(ttl);

        // INCR and EXPIRE run in one MULTI block
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, ttl)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Redis(format!("INCR failed: {e}")))?;

        Ok(count)
    }

    async fn increment_within(&self, key: &str, ttl: Duration, limit: u64) -> Result<Option<u64>, RateLimitError> {
        let mut conn = self.connection().await?;

        let count: i64 = redis::Script::new(INCREMENT_WITHIN)
            .key(self.key(key))
            .arg(limit)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Redis(format!("reserve script failed: {e}")))?;

        Ok(u64::try_from(count).ok())
    }

    async fn decrement(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.connection().await?;

        let _: i64 = redis::Script::new(DECREMENT)
            .key(self.key(key))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Redis(format!("release script failed: {e}")))?;

        Ok(())
    }
}
