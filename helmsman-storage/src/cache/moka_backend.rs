//! `moka`-backed bounded cache
//!
//! Size-bounded with optional time-to-live and time-to-idle expiry. Eviction
//! is silent, which is exactly the behaviour `BoundedStore` is built around.

use std::hash::Hash;

use helmsman_core::CacheConfig;
use moka::sync::Cache;

use super::traits::BoundedCache;

/// [`BoundedCache`] over a synchronous `moka` cache.
#[derive(Clone)]
pub struct MokaBoundedCache<K, R>
where
    K: Hash + Eq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    cache: Cache<K, R>,
}

impl<K, R> MokaBoundedCache<K, R>
where
    K: Hash + Eq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create a cache sized and timed by the given configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.time_to_live() {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.time_to_idle() {
            builder = builder.time_to_idle(tti);
        }
        Self {
            cache: builder.build(),
        }
    }

    /// Create a cache bounded only by entry count.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            cache: Cache::new(max_capacity),
        }
    }

    /// Approximate number of cached entries
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Run pending maintenance tasks (cleanup, eviction)
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl<K, R> Default for MokaBoundedCache<K, R>
where
    K: Hash + Eq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl<K, R> BoundedCache<K, R> for MokaBoundedCache<K, R>
where
    K: Hash + Eq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<R> {
        self.cache.get(key)
    }

    /// Not atomic on its own; `BoundedStore` serializes its writes.
    fn put(&self, key: K, value: R) -> Option<R> {
        let prior = self.cache.get(&key);
        self.cache.insert(key, value);
        prior
    }

    fn remove(&self, key: &K) -> Option<R> {
        self.cache.remove(key)
    }
}
