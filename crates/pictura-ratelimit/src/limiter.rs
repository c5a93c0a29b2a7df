use std::{fmt, sync::Arc, time::Duration};

use jiff::Timestamp;
use pictura_config::RateLimitConfig;

use crate::{Clock, CounterStore, RateLimitError, SystemClock};

/// Fixed wall-clock window a counter belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Minute,
    Hour,
}

impl Window {
    /// Window length, also used as the counter expiry
    pub const fn length(self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3600),
        }
    }

    /// Counter key for the window containing `now` (UTC)
    pub fn key(self, now: Timestamp) -> String {
        match self {
            Self::Minute => format!("ratelimit:minute:{}", now.strftime("%Y-%m-%d-%H-%M")),
            Self::Hour => format!("ratelimit:hour:{}", now.strftime("%Y-%m-%d-%H")),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
        })
    }
}

/// Current counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub minute: u64,
    pub hour: u64,
}

/// Slots held in both windows until released or kept
#[derive(Debug, Default)]
#[must_use = "dropping a reservation keeps its slots counted"]
pub struct Reservation {
    keys: Vec<String>,
}

/// Global generation rate limiter over two fixed windows
///
/// Bursts straddling a window boundary can briefly exceed the steady-state
/// rate; counts are per calendar minute and hour, not sliding.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    per_minute: u32,
    per_hour: u32,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create from configuration and a counter store
    pub fn new(config: &RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            enabled: config.enabled,
            per_minute: config.requests_per_minute,
            per_hour: config.requests_per_hour,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fail if either window has reached its ceiling
    pub async fn check(&self) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }

        let counts = self.counts().await?;

        if counts.minute >= u64::from(self.per_minute) {
            tracing::warn!(count = counts.minute, limit = self.per_minute, "per-minute generation limit reached");
            return Err(exceeded(Window::Minute));
        }

        if counts.hour >= u64::from(self.per_hour) {
            tracing::warn!(count = counts.hour, limit = self.per_hour, "per-hour generation limit reached");
            return Err(exceeded(Window::Hour));
        }

        Ok(())
    }

    /// Count one successful dispatch in both windows
    pub async fn increment(&self) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }

        let now = self.clock.now();

        for window in [Window::Minute, Window::Hour] {
            let count = self.store.increment(&window.key(now), window.length()).await?;
            tracing::trace!(%window, count, "incremented rate limit counter");
        }

        Ok(())
    }

    /// Take one slot in each window, failing without counting when either is full
    ///
    /// Concurrent callers can never push a window past its ceiling. Slots are
    /// counted from the start; hand the reservation to [`release`](Self::release)
    /// if the dispatch it guards fails.
    pub async fn acquire(&self) -> Result<Reservation, RateLimitError> {
        let mut reservation = Reservation::default();
        if !self.enabled {
            return Ok(reservation);
        }

        let now = self.clock.now();

        for (window, limit) in [(Window::Minute, self.per_minute), (Window::Hour, self.per_hour)] {
            let key = window.key(now);

            let taken = match self.store.increment_within(&key, window.length(), u64::from(limit)).await {
                Ok(taken) => taken,
                Err(e) => {
                    self.release(reservation).await;
                    return Err(e);
                }
            };

            let Some(count) = taken else {
                tracing::warn!(%window, limit, "generation limit reached");
                self.release(reservation).await;
                return Err(exceeded(window));
            };

            tracing::trace!(%window, count, "reserved rate limit slot");
            reservation.keys.push(key);
        }

        Ok(reservation)
    }

    /// Give back the slots of a reservation whose dispatch failed
    pub async fn release(&self, reservation: Reservation) {
        for key in reservation.keys {
            if let Err(e) = self.store.decrement(&key).await {
                tracing::warn!(key = %key, error = %e, "failed to release rate limit slot");
            }
        }
    }

    /// Read both counters for the current windows
    pub async fn counts(&self) -> Result<WindowCounts, RateLimitError> {
        let now = self.clock.now();

        Ok(WindowCounts {
            minute: self.store.get(&Window::Minute.key(now)).await?,
            hour: self.store.get(&Window::Hour.key(now)).await?,
        })
    }
}

const fn exceeded(window: Window) -> RateLimitError {
    RateLimitError::Exceeded {
        window,
        retry_after: window.length().as_secs(),
    }
}
