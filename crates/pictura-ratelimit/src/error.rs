use thiserror::Error;

use crate::Window;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Redis connection or command error
    #[error("redis error: {0}")]
    Redis(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: too many requests per {window}")]
    Exceeded {
        /// Window whose ceiling was reached
        window: Window,
        /// Seconds the caller should wait before retrying
        retry_after: u64,
    },
}
