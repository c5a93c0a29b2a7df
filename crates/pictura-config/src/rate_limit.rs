use serde::Deserialize;
use url::Url;

use crate::default_true;

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// When false, checks and increments are no-ops
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum successful dispatches per wall-clock minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Maximum successful dispatches per wall-clock hour
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
    /// Counter storage backend
    #[serde(default)]
    pub storage: RateLimitStorage,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
            storage: RateLimitStorage::default(),
        }
    }
}

/// Rate limit counter storage backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLimitStorage {
    /// In-memory storage (single instance only)
    #[default]
    Memory,
    /// Redis-backed storage (shared between instances)
    Redis(RedisConfig),
}

/// Redis configuration for rate limit counters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: Url,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Prefix prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

const fn default_requests_per_minute() -> u32 {
    5
}

const fn default_requests_per_hour() -> u32 {
    50
}

const fn default_connect_timeout() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "pictura".to_owned()
}
