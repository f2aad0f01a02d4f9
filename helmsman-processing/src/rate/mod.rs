//! Per-key rate limiting over lazily reset windows.
//!
//! A [`RateState`] counts permissions granted since the start of its current
//! window. No timer runs in the background: a window is only reset when the
//! next request arrives after the refresh period has elapsed.

pub mod linear;
pub mod period;

use std::time::{Duration, Instant};

pub use linear::LinearRateLimiter;
pub use period::PeriodRateLimiter;

/// Counter for one key within one refresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    count: u32,
    last_refresh: Instant,
}

impl RateState {
    /// Fresh state whose window starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            last_refresh: now,
        }
    }

    /// Permissions granted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Start of the current window.
    pub fn last_refresh(&self) -> Instant {
        self.last_refresh
    }

    pub(crate) fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub(crate) fn reset(&mut self, now: Instant) {
        self.count = 0;
        self.last_refresh = now;
    }
}

/// Decides whether an operation may proceed given externally held state.
pub trait RateLimiter: Send + Sync {
    /// State for a key seen for the first time.
    fn init_state(&self) -> RateState;

    /// Consume one permission from `state`.
    ///
    /// Returns `None` when the operation may proceed, or how long to wait
    /// before the current window ends.
    fn is_limited(&self, state: &mut RateState) -> Option<Duration>;
}
