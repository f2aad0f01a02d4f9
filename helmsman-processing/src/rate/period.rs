//! Limiter that owns one window per key.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use helmsman_core::{Clock, RateLimitConfig};

use super::{LinearRateLimiter, RateLimiter, RateState};

/// Per-key rate limiter backed by a concurrent map.
///
/// State for a key is created on its first request and lives until
/// [`PeriodRateLimiter::clear`] is called, typically when the resource is
/// deleted.
#[derive(Debug)]
pub struct PeriodRateLimiter<K>
where
    K: Eq + Hash,
{
    limiter: LinearRateLimiter,
    states: DashMap<K, RateState>,
}

impl<K> PeriodRateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(limiter: LinearRateLimiter) -> Self {
        Self {
            limiter,
            states: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(LinearRateLimiter::from_config(config))
    }

    /// Build from a raw limit where any value `<= 0` deactivates limiting.
    pub fn from_raw(refresh_period: Duration, limit_for_period: i32) -> Self {
        Self::new(LinearRateLimiter::from_raw(refresh_period, limit_for_period))
    }

    /// Replace the time source.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter: self.limiter.with_clock(clock),
            states: self.states,
        }
    }

    /// Request one permission for `key`.
    ///
    /// Returns `None` when the operation may proceed now, otherwise how long
    /// until the key's current window ends.
    pub fn acquire_permission(&self, key: &K) -> Option<Duration> {
        if !self.limiter.is_activated() {
            return None;
        }
        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| self.limiter.init_state());
        self.limiter.is_limited(state.value_mut())
    }

    /// Drop the state held for `key`.
    pub fn clear(&self, key: &K) {
        self.states.remove(key);
    }

    /// Number of keys with live state.
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Copy of the state held for `key`.
    pub fn state(&self, key: &K) -> Option<RateState> {
        self.states.get(key).map(|s| *s.value())
    }

    pub fn limiter(&self) -> &LinearRateLimiter {
        &self.limiter
    }
}
