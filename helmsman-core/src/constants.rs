//! Constants for helmsman
//!
//! Default values shared by configuration and the processing primitives.

use std::time::Duration;

// ============================================================================
// RETRY
// ============================================================================

/// Default maximum number of retry attempts per failure episode
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry, in milliseconds
pub const DEFAULT_RETRY_INITIAL_INTERVAL_MS: u64 = 2000;

/// Default growth factor applied to the retry interval
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 1.5;

/// Default cap on the retry interval, in milliseconds.
///
/// Equal to `floor(initial * multiplier ^ max_attempts)` for the defaults above.
pub const DEFAULT_RETRY_MAX_INTERVAL_MS: u64 = 15_187;

/// Interval used by the fixed ten-second retry preset, in milliseconds
pub const LINEAR_RETRY_INTERVAL_MS: u64 = 10_000;

/// Attempts used by the fixed ten-second retry preset
pub const LINEAR_RETRY_MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Default refresh window for rate limiting, in milliseconds
pub const DEFAULT_RATE_LIMIT_REFRESH_PERIOD_MS: u64 = 1000;

// ============================================================================
// EXPECTATION CLEANUP
// ============================================================================

/// Default interval between expectation cleanup scans, in seconds
pub const DEFAULT_EXPECTATION_CHECK_INTERVAL_SECS: u64 = 60;

/// Default grace period past an expectation's timeout before the cleaner drops it, in seconds
pub const DEFAULT_EXPECTATION_GRACE_PERIOD_SECS: u64 = 30;

// ============================================================================
// CACHE
// ============================================================================

/// Default maximum number of fully cached resources
pub const DEFAULT_CACHE_MAX_CAPACITY: u64 = 1000;

// ============================================================================
// RESOURCE KEYS
// ============================================================================

/// Separator between namespace and name in a composite resource key
pub const KEY_SEPARATOR: char = '/';

/// Convenience accessor for the default retry initial interval.
pub const fn default_retry_initial_interval() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_INITIAL_INTERVAL_MS)
}

/// Convenience accessor for the default retry maximum interval.
pub const fn default_retry_max_interval() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_MAX_INTERVAL_MS)
}
