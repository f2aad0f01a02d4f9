//! Helmsman Test Utilities
//!
//! Centralized test infrastructure for the helmsman workspace:
//! - Mock fetcher and bounded cache with call counters
//! - A manually driven clock
//! - Proptest generators for resources and configuration
//! - Test fixtures and assertions

pub use helmsman_core::{
    namespace_key, Clock, ConfigError, ExpectationError, HelmsmanConfig, HelmsmanError,
    HelmsmanResult, RateLimitConfig, Resource, ResourceId, RetryConfig, StoreError,
};
pub use helmsman_storage::{BoundedCache, ResourceFetcher};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TEST RESOURCE
// ============================================================================

/// Minimal watched resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestResource {
    pub namespace: Option<String>,
    pub name: String,
    pub resource_version: u64,
}

impl TestResource {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
            resource_version: 1,
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
            resource_version: 1,
        }
    }

    pub fn with_version(mut self, resource_version: u64) -> Self {
        self.resource_version = resource_version;
        self
    }

    /// Store key under the default namespace/name composition.
    pub fn key(&self) -> String {
        namespace_key(self.namespace.as_deref(), &self.name)
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::from_resource(self)
    }
}

impl Resource for TestResource {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// MOCK FETCHER
// ============================================================================

/// Holds fetches in flight until released.
///
/// Every fetch through a gated [`MockFetcher`] signals `entered` and then
/// waits for one `release`.
#[derive(Debug, Default)]
pub struct FetchGate {
    entered: Notify,
    release: Notify,
}

impl FetchGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a fetch has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting (or the next) fetch continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Programmable [`ResourceFetcher`] that counts its calls.
#[derive(Debug)]
pub struct MockFetcher<K, R> {
    resources: Mutex<HashMap<K, R>>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
    gate: Option<Arc<FetchGate>>,
}

impl<K, R> Default for MockFetcher<K, R> {
    fn default() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }
}

impl<K, R> MockFetcher<K, R>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync,
    R: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every fetch on the given gate.
    pub fn with_gate(mut self, gate: Arc<FetchGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Make `key` resolve to `value`.
    pub fn insert(&self, key: K, value: R) {
        lock(&self.resources).insert(key, value);
    }

    /// Make `key` resolve to nothing.
    pub fn remove(&self, key: &K) {
        lock(&self.resources).remove(key);
    }

    /// Fail every fetch with the given reason until [`MockFetcher::succeed`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        *lock(&self.failure) = Some(reason.into());
    }

    pub fn succeed(&self) {
        *lock(&self.failure) = None;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K, R> ResourceFetcher<K, R> for MockFetcher<K, R>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + Sync,
    R: Clone + Send + Sync,
{
    async fn fetch(&self, key: &K) -> HelmsmanResult<Option<R>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let failure = lock(&self.failure).clone();
        if let Some(reason) = failure {
            return Err(StoreError::FetchFailed {
                key: format!("{key:?}"),
                reason,
            }
            .into());
        }
        Ok(lock(&self.resources).get(key).cloned())
    }
}

// ============================================================================
// MOCK BOUNDED CACHE
// ============================================================================

/// Unbounded [`BoundedCache`] with manual eviction and a read counter.
#[derive(Debug)]
pub struct MockBoundedCache<K, R> {
    entries: Mutex<HashMap<K, R>>,
    get_calls: AtomicUsize,
}

impl<K, R> Default for MockBoundedCache<K, R> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            get_calls: AtomicUsize::new(0),
        }
    }
}

impl<K, R> MockBoundedCache<K, R>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an entry as a capacity eviction would.
    pub fn evict(&self, key: &K) {
        lock(&self.entries).remove(key);
    }

    pub fn evict_all(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Number of `get` calls made so far.
    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl<K, R> BoundedCache<K, R> for MockBoundedCache<K, R>
where
    K: Eq + Hash + Send + Sync,
    R: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<R> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).get(key).cloned()
    }

    fn put(&self, key: K, value: R) -> Option<R> {
        lock(&self.entries).insert(key, value)
    }

    fn remove(&self, key: &K) -> Option<R> {
        lock(&self.entries).remove(key)
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for helmsman types.

    use super::*;
    use proptest::prelude::*;
    use std::num::NonZeroU32;

    /// DNS-label style namespace.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,14}"
    }

    /// Resource name, may contain dots.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9.-]{0,24}"
    }

    pub fn arb_resource_id() -> impl Strategy<Value = ResourceId> {
        (proptest::option::of(arb_namespace()), arb_name()).prop_map(|(ns, name)| match ns {
            Some(ns) => ResourceId::namespaced(ns, name),
            None => ResourceId::cluster_scoped(name),
        })
    }

    pub fn arb_test_resource() -> impl Strategy<Value = TestResource> {
        (
            proptest::option::of(arb_namespace()),
            arb_name(),
            1u64..1_000_000,
        )
            .prop_map(|(namespace, name, resource_version)| TestResource {
                namespace,
                name,
                resource_version,
            })
    }

    /// Retry configuration that passes validation.
    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (
            proptest::option::of(0u32..20),
            1u64..10_000,
            1.0f64..4.0,
            proptest::option::of(1u64..100),
        )
            .prop_map(
                |(max_attempts, initial_interval_ms, interval_multiplier, cap_factor)| {
                    RetryConfig {
                        max_attempts,
                        initial_interval_ms,
                        interval_multiplier,
                        max_interval_ms: cap_factor.map(|f| initial_interval_ms * f),
                    }
                },
            )
    }

    /// Enabled rate-limit configuration.
    pub fn arb_rate_limit_config() -> impl Strategy<Value = RateLimitConfig> {
        (1u64..10_000, 1u32..50).prop_map(|(refresh_period_ms, limit)| RateLimitConfig {
            refresh_period_ms,
            limit_for_period: NonZeroU32::new(limit),
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// `default/test1`
    pub fn test_resource_1() -> TestResource {
        TestResource::namespaced("default", "test1")
    }

    /// `default/test2`
    pub fn test_resource_2() -> TestResource {
        TestResource::namespaced("default", "test2")
    }

    /// Cluster-scoped `node-1`
    pub fn cluster_resource() -> TestResource {
        TestResource::cluster_scoped("node-1")
    }

    /// Empty cache and fetcher for string-keyed resource tests.
    pub fn string_keyed_mocks() -> (
        Arc<MockBoundedCache<String, TestResource>>,
        Arc<MockFetcher<String, TestResource>>,
    ) {
        (Arc::new(MockBoundedCache::new()), Arc::new(MockFetcher::new()))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over helmsman results.

    use super::*;

    /// Assert that a HelmsmanResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &HelmsmanResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a HelmsmanResult is a fetch failure.
    #[track_caller]
    pub fn assert_fetch_failed<T: std::fmt::Debug>(result: &HelmsmanResult<T>) {
        match result {
            Err(HelmsmanError::Store(StoreError::FetchFailed { .. })) => {}
            other => panic!("Expected FetchFailed error, got: {:?}", other),
        }
    }

    /// Assert that a HelmsmanResult is an expectation evaluation failure.
    #[track_caller]
    pub fn assert_expectation_error<T: std::fmt::Debug>(result: &HelmsmanResult<T>) {
        match result {
            Err(HelmsmanError::Expectation(ExpectationError::EvaluationFailed { .. })) => {}
            other => panic!("Expected expectation error, got: {:?}", other),
        }
    }

    /// Assert that a config result failed validation on `field`.
    #[track_caller]
    pub fn assert_invalid_field<T: std::fmt::Debug>(result: &Result<T, ConfigError>, field: &str) {
        match result {
            Err(ConfigError::InvalidValue { field: f, .. }) => {
                assert_eq!(f, field, "Wrong field in InvalidValue error");
            }
            other => panic!("Expected InvalidValue for {field}, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
