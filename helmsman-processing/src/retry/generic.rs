//! Exponential and linear backoff.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use helmsman_core::constants::{
    default_retry_initial_interval, default_retry_max_interval, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MULTIPLIER, LINEAR_RETRY_INTERVAL_MS, LINEAR_RETRY_MAX_ATTEMPTS,
};
use helmsman_core::{ConfigError, RetryConfig};

use super::{Retry, RetryExecution};

// ============================================================================
// POLICY
// ============================================================================

/// Backoff policy with an optional attempt limit and interval cap.
///
/// The delays handed out by an execution are
/// `initial, initial, initial * m, initial * m^2, ...`, each capped at
/// `max_interval`. A multiplier of `1.0` gives a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRetry {
    max_attempts: Option<u32>,
    initial_interval: Duration,
    interval_multiplier: f64,
    max_interval: Option<Duration>,
}

impl Default for GenericRetry {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_RETRY_MAX_ATTEMPTS),
            initial_interval: default_retry_initial_interval(),
            interval_multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_interval: Some(default_retry_max_interval()),
        }
    }
}

impl GenericRetry {
    /// 5 attempts starting at 2s, growing by 1.5, capped at 15187ms.
    pub fn default_limited_exponential() -> Self {
        Self::default()
    }

    /// Never retries.
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(0)
    }

    /// Ten attempts, ten seconds apart.
    pub fn every_10_seconds_10_times() -> Self {
        Self::default()
            .with_linear_retry()
            .with_max_attempts(LINEAR_RETRY_MAX_ATTEMPTS)
            .with_initial_interval(Duration::from_millis(LINEAR_RETRY_INTERVAL_MS))
    }

    /// Build a policy from a validated [`RetryConfig`].
    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            max_attempts: config.max_attempts,
            initial_interval: config.initial_interval(),
            interval_multiplier: config.interval_multiplier,
            max_interval: config.max_interval(),
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval;
        self
    }

    /// Multipliers below `1.0` or non-finite values fall back to `1.0`.
    pub fn with_interval_multiplier(mut self, interval_multiplier: f64) -> Self {
        let valid = interval_multiplier.is_finite() && interval_multiplier >= 1.0;
        self.interval_multiplier = if valid {
            interval_multiplier
        } else {
            tracing::warn!(interval_multiplier, "Invalid retry multiplier, using a fixed interval");
            1.0
        };
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    pub fn without_max_interval(mut self) -> Self {
        self.max_interval = None;
        self
    }

    /// Retry forever.
    pub fn without_max_attempts(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Keep the interval fixed at the initial interval.
    pub fn with_linear_retry(mut self) -> Self {
        self.interval_multiplier = 1.0;
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn interval_multiplier(&self) -> f64 {
        self.interval_multiplier
    }

    pub fn max_interval(&self) -> Option<Duration> {
        self.max_interval
    }
}

impl Retry for GenericRetry {
    type Execution = GenericRetryExecution;

    fn init_execution(&self) -> GenericRetryExecution {
        GenericRetryExecution::new(self.clone())
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

#[derive(Debug)]
struct ExecutionState {
    attempt: u32,
    current_interval: Duration,
}

/// Backoff state for one failure episode of a [`GenericRetry`].
#[derive(Debug)]
pub struct GenericRetryExecution {
    retry: GenericRetry,
    state: Mutex<ExecutionState>,
}

impl GenericRetryExecution {
    pub fn new(retry: GenericRetry) -> Self {
        let current_interval = retry.initial_interval;
        Self {
            retry,
            state: Mutex::new(ExecutionState {
                attempt: 0,
                current_interval,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ExecutionState> {
        // State is consistent after every update; poisoning is ignored.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.retry.max_attempts.is_some_and(|max| attempt >= max)
    }

    /// Interval after one multiplication, truncated to whole milliseconds.
    fn grow(&self, interval: Duration) -> Duration {
        let scaled = interval.as_secs_f64() * self.retry.interval_multiplier;
        let next = Duration::try_from_secs_f64(scaled)
            .unwrap_or(Duration::MAX)
            .max(interval);
        match self.retry.max_interval {
            Some(cap) if next > cap => cap,
            _ => next,
        }
    }

    pub fn retry(&self) -> &GenericRetry {
        &self.retry
    }
}

impl RetryExecution for GenericRetryExecution {
    fn next_delay(&self) -> Option<Duration> {
        let mut state = self.state();
        if self.exhausted(state.attempt) {
            tracing::debug!(attempts = state.attempt, "Retry attempts exhausted");
            return None;
        }
        if state.attempt > 1 {
            state.current_interval = self.grow(state.current_interval);
        }
        state.attempt += 1;
        tracing::debug!(
            attempt = state.attempt,
            delay_ms = state.current_interval.as_millis() as u64,
            "Scheduling retry"
        );
        Some(state.current_interval)
    }

    fn is_last_attempt(&self) -> bool {
        self.exhausted(self.state().attempt)
    }

    fn attempt_count(&self) -> u32 {
        self.state().attempt
    }
}
