//! Time source abstraction.
//!
//! Rate limiting and expectation timeouts read the current instant through a
//! [`Clock`] so tests can drive time by hand.

use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic instants.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared handle to the system clock.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
