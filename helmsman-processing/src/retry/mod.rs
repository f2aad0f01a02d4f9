//! Retry policies and per-episode backoff state.
//!
//! A [`Retry`] is an immutable policy. Each failure episode gets its own
//! [`RetryExecution`] from [`Retry::init_execution`], discarded once the
//! operation succeeds or the execution is exhausted.

pub mod generic;

use std::time::Duration;

pub use generic::{GenericRetry, GenericRetryExecution};

/// Retry policy.
pub trait Retry: Send + Sync {
    type Execution: RetryExecution;

    /// Start a new failure episode.
    fn init_execution(&self) -> Self::Execution;
}

/// Backoff state for one failure episode.
pub trait RetryExecution: Send + Sync {
    /// Delay before the next attempt, or `None` once attempts are exhausted.
    fn next_delay(&self) -> Option<Duration>;

    /// Whether the attempt budget has been used up.
    fn is_last_attempt(&self) -> bool;

    /// Delays handed out so far.
    fn attempt_count(&self) -> u32;
}
