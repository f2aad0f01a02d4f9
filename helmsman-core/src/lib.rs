//! Helmsman Core - Shared Types
//!
//! Error types, resource identity, time source and configuration. Every other
//! helmsman crate depends on this one; it carries no async runtime.

pub mod config;
pub mod constants;
pub mod error;
pub mod resource;
pub mod time;

pub use config::{
    CacheConfig, ExpectationCleanerConfig, HelmsmanConfig, RateLimitConfig, RetryConfig,
};
pub use error::{ConfigError, ExpectationError, HelmsmanError, HelmsmanResult, StoreError};
pub use resource::{namespace_key, split_key, FnPresence, Resource, ResourceId, ResourcePresence};
pub use time::{system_clock, Clock, SystemClock};
