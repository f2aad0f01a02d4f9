//! Fixed-window limiter shared across keys.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use helmsman_core::{system_clock, Clock, RateLimitConfig};

use super::{RateLimiter, RateState};

/// Allows `limit_for_period` permissions per `refresh_period`.
///
/// Holds no per-key state itself; callers keep one [`RateState`] per key.
/// A limiter without a limit is deactivated and permits everything.
#[derive(Debug, Clone)]
pub struct LinearRateLimiter {
    refresh_period: Duration,
    limit_for_period: Option<NonZeroU32>,
    clock: Arc<dyn Clock>,
}

impl LinearRateLimiter {
    pub fn new(refresh_period: Duration, limit_for_period: Option<NonZeroU32>) -> Self {
        Self {
            refresh_period,
            limit_for_period,
            clock: system_clock(),
        }
    }

    /// Build from a raw limit where any value `<= 0` deactivates limiting.
    pub fn from_raw(refresh_period: Duration, limit_for_period: i32) -> Self {
        Self::from_config(&RateLimitConfig::from_raw(refresh_period, limit_for_period))
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.refresh_period(), config.limit_for_period)
    }

    /// Limiter that never denies.
    pub fn deactivated() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_activated(&self) -> bool {
        self.limit_for_period.is_some()
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    pub fn limit_for_period(&self) -> Option<NonZeroU32> {
        self.limit_for_period
    }
}

impl Default for LinearRateLimiter {
    fn default() -> Self {
        Self::deactivated()
    }
}

impl RateLimiter for LinearRateLimiter {
    fn init_state(&self) -> RateState {
        RateState::new(self.clock.now())
    }

    fn is_limited(&self, state: &mut RateState) -> Option<Duration> {
        let limit = self.limit_for_period?.get();

        if state.count() < limit {
            state.increment();
            return None;
        }

        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refresh());
        if elapsed >= self.refresh_period {
            state.reset(now);
            state.increment();
            return None;
        }

        let wait = self.refresh_period - elapsed;
        tracing::trace!(
            count = state.count(),
            limit,
            wait_ms = wait.as_millis() as u64,
            "Rate limit reached"
        );
        Some(wait)
    }
}
