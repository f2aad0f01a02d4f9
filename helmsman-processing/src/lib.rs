//! Helmsman Processing - Reconciliation Control
//!
//! Per-resource rate limiting, retry delay schedules, and expectations that a
//! reconciler registers after triggering a change and checks on later.

pub mod expectation;
pub mod rate;
pub mod retry;

pub use expectation::{
    expectation_cleanup_task, Expectation, ExpectationCleanupMetrics, ExpectationCleanupSnapshot,
    ExpectationManager, ExpectationResult, ExpectationStatus, FnExpectation,
    PeriodicCleanerExpectationManager, RegisteredExpectation, SharedExpectation, StaleReason,
    TryFnExpectation,
};
pub use rate::{LinearRateLimiter, PeriodRateLimiter, RateLimiter, RateState};
pub use retry::{GenericRetry, GenericRetryExecution, Retry, RetryExecution};
