//! Integration tests for retry schedules.

use std::time::Duration;

use helmsman_core::RetryConfig;
use helmsman_processing::{GenericRetry, Retry, RetryExecution};
use helmsman_test_utils::generators::arb_retry_config;
use proptest::prelude::*;

#[test]
fn executions_are_independent() {
    let retry = GenericRetry::default_limited_exponential();
    let first = retry.init_execution();
    let second = retry.init_execution();

    first.next_delay();
    first.next_delay();
    first.next_delay();

    assert_eq!(second.next_delay(), Some(Duration::from_secs(2)));
    assert_eq!(first.attempt_count(), 3);
    assert_eq!(second.attempt_count(), 1);
}

#[test]
fn config_round_trips_into_policy() {
    let config = RetryConfig {
        max_attempts: Some(3),
        initial_interval_ms: 100,
        interval_multiplier: 2.0,
        max_interval_ms: Some(150),
    };
    let execution = GenericRetry::from_config(&config).unwrap().init_execution();

    let delays: Vec<_> = std::iter::from_fn(|| execution.next_delay()).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(100),
            Duration::from_millis(150),
        ]
    );
    assert!(execution.is_last_attempt());
}

proptest! {
    /// Delays never shrink, never exceed the cap, and stop after the
    /// configured number of attempts.
    #[test]
    fn delays_are_monotonic_capped_and_bounded(config in arb_retry_config()) {
        let retry = GenericRetry::from_config(&config).unwrap();
        let execution = retry.init_execution();
        let horizon = 30usize;

        let delays: Vec<Duration> = (0..horizon).map_while(|_| execution.next_delay()).collect();

        match config.max_attempts {
            Some(max) => prop_assert_eq!(delays.len(), (max as usize).min(horizon)),
            None => prop_assert_eq!(delays.len(), horizon),
        }
        if let Some(first) = delays.first() {
            prop_assert_eq!(*first, config.initial_interval());
        }
        for pair in delays.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        if let Some(cap) = config.max_interval() {
            prop_assert!(delays.iter().all(|d| *d <= cap));
        }
        prop_assert_eq!(execution.attempt_count() as usize, delays.len());
    }
}
