//! Error types for helmsman operations

use thiserror::Error;

/// Resource store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Fetch failed for key {key}: {reason}")]
    FetchFailed { key: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Expectation evaluation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpectationError {
    #[error("Expectation '{name}' failed to evaluate: {reason}")]
    EvaluationFailed { name: String, reason: String },
}

/// Master error type for all helmsman errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HelmsmanError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Expectation error: {0}")]
    Expectation(#[from] ExpectationError),
}

/// Result type alias for helmsman operations.
pub type HelmsmanResult<T> = Result<T, HelmsmanError>;

// =============================================================================
// TESTS
// =============================================================================
