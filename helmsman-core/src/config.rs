//! Configuration types
//!
//! Every section has defaults taken from [`crate::constants`]. A config can be
//! built from defaults, from `HELMSMAN_*` environment variables, or from a
//! TOML document; durations are written in milliseconds (`*_ms` fields).
//!
//! Files and environment variables share the integer sentinels: a negative
//! `max_attempts` means unlimited, a negative `max_interval_ms` means
//! uncapped, and a `limit_for_period` of zero or less disables rate limiting.

use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;

/// Retry policy for one failure episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum attempts per episode, `None` for unlimited
    #[serde(with = "sentinel::negative_is_none_u32")]
    pub max_attempts: Option<u32>,
    pub initial_interval_ms: u64,
    /// Growth factor, `1.0` for a fixed interval
    pub interval_multiplier: f64,
    /// Interval cap, `None` for uncapped
    #[serde(with = "sentinel::negative_is_none_u64")]
    pub max_interval_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_RETRY_MAX_ATTEMPTS),
            initial_interval_ms: DEFAULT_RETRY_INITIAL_INTERVAL_MS,
            interval_multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_interval_ms: Some(DEFAULT_RETRY_MAX_INTERVAL_MS),
        }
    }
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Option<Duration> {
        self.max_interval_ms.map(Duration::from_millis)
    }

    /// Check the multiplier, initial interval and cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.interval_multiplier.is_finite() || self.interval_multiplier < 1.0 {
            return Err(invalid(
                "retry.interval_multiplier",
                self.interval_multiplier,
                "interval_multiplier must be a finite value >= 1.0",
            ));
        }
        if self.initial_interval_ms == 0 {
            return Err(invalid(
                "retry.initial_interval_ms",
                self.initial_interval_ms,
                "initial_interval_ms must be positive",
            ));
        }
        if let Some(max) = self.max_interval_ms {
            if max < self.initial_interval_ms {
                return Err(invalid(
                    "retry.max_interval_ms",
                    max,
                    "max_interval_ms must not be smaller than initial_interval_ms",
                ));
            }
        }
        Ok(())
    }
}

/// Per-key rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub refresh_period_ms: u64,
    /// Permissions per window, `None` disables limiting
    #[serde(with = "sentinel::non_positive_is_none")]
    pub limit_for_period: Option<NonZeroU32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refresh_period_ms: DEFAULT_RATE_LIMIT_REFRESH_PERIOD_MS,
            limit_for_period: None,
        }
    }
}

impl RateLimitConfig {
    /// Build from a raw limit where any value `<= 0` disables limiting.
    pub fn from_raw(refresh_period: Duration, limit_for_period: i32) -> Self {
        Self {
            refresh_period_ms: u64::try_from(refresh_period.as_millis()).unwrap_or(u64::MAX),
            limit_for_period: u32::try_from(limit_for_period)
                .ok()
                .and_then(NonZeroU32::new),
        }
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    pub fn is_enabled(&self) -> bool {
        self.limit_for_period.is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.is_enabled() && self.refresh_period_ms == 0 {
            return Err(invalid(
                "rate_limit.refresh_period_ms",
                self.refresh_period_ms,
                "refresh_period_ms must be positive when limiting is enabled",
            ));
        }
        Ok(())
    }
}

/// Background cleanup of abandoned expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpectationCleanerConfig {
    pub check_interval_ms: u64,
    /// Extra time past an expectation's own timeout before it is dropped
    pub grace_period_ms: u64,
    /// Whether each removed registration is logged
    pub log_removals: bool,
}

impl Default for ExpectationCleanerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_EXPECTATION_CHECK_INTERVAL_SECS * 1000,
            grace_period_ms: DEFAULT_EXPECTATION_GRACE_PERIOD_SECS * 1000,
            log_removals: true,
        }
    }
}

impl ExpectationCleanerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Short intervals for development and tests.
    pub fn development() -> Self {
        Self {
            check_interval_ms: 1000,
            grace_period_ms: 0,
            log_removals: true,
        }
    }

    /// Longer grace for clusters with slow convergence.
    pub fn production() -> Self {
        Self {
            check_interval_ms: DEFAULT_EXPECTATION_CHECK_INTERVAL_SECS * 1000,
            grace_period_ms: 5 * 60 * 1000,
            log_removals: false,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_ms == 0 {
            return Err(invalid(
                "expectation_cleaner.check_interval_ms",
                self.check_interval_ms,
                "check_interval_ms must be positive",
            ));
        }
        Ok(())
    }
}

/// Bounds for the full-resource cache behind a bounded store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub time_to_live_ms: Option<u64>,
    pub time_to_idle_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_CACHE_MAX_CAPACITY,
            time_to_live_ms: None,
            time_to_idle_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live_ms.map(Duration::from_millis)
    }

    pub fn time_to_idle(&self) -> Option<Duration> {
        self.time_to_idle_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_capacity == 0 {
            return Err(invalid(
                "cache.max_capacity",
                self.max_capacity,
                "max_capacity must be positive",
            ));
        }
        Ok(())
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HelmsmanConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub expectation_cleaner: ExpectationCleanerConfig,
    pub cache: CacheConfig,
}

impl HelmsmanConfig {
    /// Create config from environment variables.
    ///
    /// # Environment Variables
    /// - `HELMSMAN_RETRY_MAX_ATTEMPTS`: attempts per episode, negative for unlimited (default: 5)
    /// - `HELMSMAN_RETRY_INITIAL_INTERVAL_MS`: first delay (default: 2000)
    /// - `HELMSMAN_RETRY_MULTIPLIER`: interval growth factor (default: 1.5)
    /// - `HELMSMAN_RETRY_MAX_INTERVAL_MS`: interval cap, negative for none (default: 15187)
    /// - `HELMSMAN_RATE_LIMIT_REFRESH_PERIOD_MS`: window length (default: 1000)
    /// - `HELMSMAN_RATE_LIMIT_LIMIT_FOR_PERIOD`: permissions per window, `<= 0` disables (default: disabled)
    /// - `HELMSMAN_EXPECTATION_CHECK_INTERVAL_MS`: cleaner period (default: 60000)
    /// - `HELMSMAN_EXPECTATION_GRACE_PERIOD_MS`: cleaner grace (default: 30000)
    /// - `HELMSMAN_EXPECTATION_LOG_REMOVALS`: log each removal (default: true)
    /// - `HELMSMAN_CACHE_MAX_CAPACITY`: cached resources (default: 1000)
    /// - `HELMSMAN_CACHE_TTL_MS` / `HELMSMAN_CACHE_TTI_MS`: optional expiry
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`HelmsmanConfig::from_env`] with a caller-supplied variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_i64 = |name: &str| lookup(name).and_then(|s| s.trim().parse::<i64>().ok());
        let parse_u64 = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let retry = RetryConfig {
            max_attempts: match parse_i64("HELMSMAN_RETRY_MAX_ATTEMPTS") {
                Some(n) if n < 0 => None,
                Some(n) => Some(u32::try_from(n).unwrap_or(u32::MAX)),
                None => defaults.retry.max_attempts,
            },
            initial_interval_ms: parse_u64("HELMSMAN_RETRY_INITIAL_INTERVAL_MS")
                .unwrap_or(defaults.retry.initial_interval_ms),
            interval_multiplier: lookup("HELMSMAN_RETRY_MULTIPLIER")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(defaults.retry.interval_multiplier),
            max_interval_ms: match parse_i64("HELMSMAN_RETRY_MAX_INTERVAL_MS") {
                Some(n) if n < 0 => None,
                Some(n) => Some(n.unsigned_abs()),
                None => defaults.retry.max_interval_ms,
            },
        };

        let rate_limit = RateLimitConfig {
            refresh_period_ms: parse_u64("HELMSMAN_RATE_LIMIT_REFRESH_PERIOD_MS")
                .unwrap_or(defaults.rate_limit.refresh_period_ms),
            limit_for_period: match parse_i64("HELMSMAN_RATE_LIMIT_LIMIT_FOR_PERIOD") {
                Some(n) => u32::try_from(n).ok().and_then(NonZeroU32::new),
                None => defaults.rate_limit.limit_for_period,
            },
        };

        let expectation_cleaner = ExpectationCleanerConfig {
            check_interval_ms: parse_u64("HELMSMAN_EXPECTATION_CHECK_INTERVAL_MS")
                .unwrap_or(defaults.expectation_cleaner.check_interval_ms),
            grace_period_ms: parse_u64("HELMSMAN_EXPECTATION_GRACE_PERIOD_MS")
                .unwrap_or(defaults.expectation_cleaner.grace_period_ms),
            log_removals: lookup("HELMSMAN_EXPECTATION_LOG_REMOVALS")
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.expectation_cleaner.log_removals),
        };

        let cache = CacheConfig {
            max_capacity: parse_u64("HELMSMAN_CACHE_MAX_CAPACITY")
                .unwrap_or(defaults.cache.max_capacity),
            time_to_live_ms: parse_u64("HELMSMAN_CACHE_TTL_MS").or(defaults.cache.time_to_live_ms),
            time_to_idle_ms: parse_u64("HELMSMAN_CACHE_TTI_MS").or(defaults.cache.time_to_idle_ms),
        };

        Self {
            retry,
            rate_limit,
            expectation_cleaner,
            cache,
        }
    }

    /// Parse and validate a TOML document. Missing sections and fields fall
    /// back to defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.rate_limit.validate()?;
        self.expectation_cleaner.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

mod sentinel {
    //! Serde adapters for the integer sentinels used in config files.

    pub mod negative_is_none_u32 {
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<u32>, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_i64(value.map_or(-1, i64::from))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
            let raw = i64::deserialize(d)?;
            if raw < 0 {
                return Ok(None);
            }
            u32::try_from(raw).map(Some).map_err(D::Error::custom)
        }
    }

    pub mod negative_is_none_u64 {
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_i64(value.map_or(-1, |v| i64::try_from(v).unwrap_or(i64::MAX)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            let raw = i64::deserialize(d)?;
            if raw < 0 {
                return Ok(None);
            }
            u64::try_from(raw).map(Some).map_err(D::Error::custom)
        }
    }

    pub mod non_positive_is_none {
        use std::num::NonZeroU32;

        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NonZeroU32>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            s.serialize_i64(value.map_or(0, |v| i64::from(v.get())))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NonZeroU32>, D::Error> {
            let raw = i64::deserialize(d)?;
            if raw <= 0 {
                return Ok(None);
            }
            u32::try_from(raw)
                .map(NonZeroU32::new)
                .map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HelmsmanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.initial_interval(), Duration::from_millis(2000));
        assert_eq!(config.retry.max_interval(), Some(Duration::from_millis(15_187)));
        assert!(!config.rate_limit.is_enabled());
        assert_eq!(config.expectation_cleaner.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = HelmsmanConfig::from_lookup(|_| None);
        assert_eq!(config, HelmsmanConfig::default());
    }

    #[test]
    fn test_from_lookup_sentinels() {
        let config = HelmsmanConfig::from_lookup(lookup_from(&[
            ("HELMSMAN_RETRY_MAX_ATTEMPTS", "-1"),
            ("HELMSMAN_RETRY_MAX_INTERVAL_MS", "-1"),
            ("HELMSMAN_RATE_LIMIT_LIMIT_FOR_PERIOD", "0"),
            ("HELMSMAN_EXPECTATION_LOG_REMOVALS", "FALSE"),
        ]));
        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.retry.max_interval_ms, None);
        assert!(!config.rate_limit.is_enabled());
        assert!(!config.expectation_cleaner.log_removals);
    }

    #[test]
    fn test_from_lookup_values() {
        let config = HelmsmanConfig::from_lookup(lookup_from(&[
            ("HELMSMAN_RETRY_MAX_ATTEMPTS", "3"),
            ("HELMSMAN_RETRY_MULTIPLIER", "2.0"),
            ("HELMSMAN_RATE_LIMIT_REFRESH_PERIOD_MS", "2000"),
            ("HELMSMAN_RATE_LIMIT_LIMIT_FOR_PERIOD", "3"),
            ("HELMSMAN_CACHE_MAX_CAPACITY", "50"),
            ("HELMSMAN_CACHE_TTL_MS", "60000"),
        ]));
        assert_eq!(config.retry.max_attempts, Some(3));
        assert!((config.retry.interval_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.refresh_period(), Duration::from_secs(2));
        assert_eq!(config.rate_limit.limit_for_period, NonZeroU32::new(3));
        assert_eq!(config.cache.max_capacity, 50);
        assert_eq!(config.cache.time_to_live(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_rate_limit_from_raw() {
        assert!(!RateLimitConfig::from_raw(Duration::from_secs(1), 0).is_enabled());
        assert!(!RateLimitConfig::from_raw(Duration::from_secs(1), -1).is_enabled());
        let enabled = RateLimitConfig::from_raw(Duration::from_secs(2), 3);
        assert_eq!(enabled.limit_for_period, NonZeroU32::new(3));
        assert_eq!(enabled.refresh_period_ms, 2000);
    }

    #[test]
    fn test_validate_rejects_shrinking_multiplier() {
        let mut config = HelmsmanConfig::default();
        config.retry.interval_multiplier = 0.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "retry.interval_multiplier"
        ));
    }

    #[test]
    fn test_validate_rejects_cap_below_initial() {
        let mut config = HelmsmanConfig::default();
        config.retry.max_interval_ms = Some(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cleaner_interval() {
        let mut config = HelmsmanConfig::default();
        config.expectation_cleaner.check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = HelmsmanConfig::default();
        config.cache.max_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = HelmsmanConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 10
            interval_multiplier = 1.0

            [rate_limit]
            refresh_period_ms = 2000
            limit_for_period = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, Some(10));
        assert_eq!(config.retry.initial_interval_ms, 2000);
        assert_eq!(config.rate_limit.limit_for_period, NonZeroU32::new(3));
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_from_toml_sentinels() {
        let config = HelmsmanConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = -1
            max_interval_ms = -1

            [rate_limit]
            limit_for_period = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.retry.max_interval(), None);
        assert!(!config.rate_limit.is_enabled());

        let negative =
            HelmsmanConfig::from_toml_str("[rate_limit]\nlimit_for_period = -1\n").unwrap();
        assert!(!negative.rate_limit.is_enabled());
    }

    #[test]
    fn test_toml_sentinels_survive_serialization() {
        let mut config = HelmsmanConfig::default();
        config.retry.max_attempts = None;
        config.retry.max_interval_ms = None;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(HelmsmanConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_from_toml_validates() {
        let err =
            HelmsmanConfig::from_toml_str("[retry]\ninterval_multiplier = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_toml_rejects_unknown_fields() {
        let err = HelmsmanConfig::from_toml_str("[retry]\nmax_retries = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helmsman.toml");
        std::fs::write(&path, "[cache]\nmax_capacity = 0\n").unwrap();
        assert!(matches!(
            HelmsmanConfig::from_path(&path),
            Err(ConfigError::InvalidValue { .. })
        ));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            HelmsmanConfig::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
