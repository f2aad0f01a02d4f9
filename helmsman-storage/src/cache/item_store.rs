//! Resource-keyed bounded store.
//!
//! Wraps [`BoundedStore`] with string keys derived from each resource, by
//! default `namespace/name` for namespaced resources and `name` for
//! cluster-scoped ones.

use std::sync::Arc;

use helmsman_core::{namespace_key, HelmsmanResult, Resource, ResourceId, ResourcePresence};

use super::bounded_store::BoundedStore;
use super::traits::{BoundedCache, ResourceFetcher, StoreStatsSnapshot};

/// Function deriving the store key of a resource.
pub type KeyFn<R> = Arc<dyn Fn(&R) -> String + Send + Sync>;

/// Default key function: `namespace/name`, or `name` when cluster-scoped.
pub fn namespace_key_fn<R: Resource>() -> KeyFn<R> {
    Arc::new(|resource: &R| namespace_key(resource.namespace(), resource.name()))
}

/// Bounded store of watched resources keyed by string.
pub struct BoundedItemStore<R, C, F> {
    store: BoundedStore<String, R, C, F>,
    key_fn: KeyFn<R>,
}

impl<R, C, F> BoundedItemStore<R, C, F>
where
    R: Resource + Clone + Send + Sync,
    C: BoundedCache<String, R>,
    F: ResourceFetcher<String, R>,
{
    /// Create a store using the namespace/name key function.
    pub fn new(cache: Arc<C>, fetcher: Arc<F>) -> Self {
        Self::with_key_fn(cache, fetcher, namespace_key_fn())
    }

    pub fn with_key_fn(cache: Arc<C>, fetcher: Arc<F>, key_fn: KeyFn<R>) -> Self {
        Self {
            store: BoundedStore::new(cache, fetcher),
            key_fn,
        }
    }

    /// Store key of a resource.
    pub fn get_key(&self, resource: &R) -> String {
        (self.key_fn)(resource)
    }

    pub async fn get(&self, key: &str) -> HelmsmanResult<Option<R>> {
        self.store.get(&key.to_string()).await
    }

    /// Get by identifier, assuming the default key composition.
    pub async fn get_by_id(&self, id: &ResourceId) -> HelmsmanResult<Option<R>> {
        self.store.get(&id.key()).await
    }

    pub fn put(&self, key: String, resource: R) -> HelmsmanResult<Option<R>> {
        self.store.put(key, resource)
    }

    /// Store a resource under the key derived from it.
    pub fn put_resource(&self, resource: R) -> HelmsmanResult<Option<R>> {
        let key = self.get_key(&resource);
        self.store.put(key, resource)
    }

    pub fn remove(&self, key: &str) -> HelmsmanResult<Option<R>> {
        self.store.remove(&key.to_string())
    }

    /// Keys of all resources believed to exist. Never reads the cache.
    pub fn key_set(&self) -> HelmsmanResult<Vec<String>> {
        self.store.keys()
    }

    /// One value per existing key.
    ///
    /// Evicted resources are fetched one by one, so this is meant for listing
    /// and diagnostics, not for the reconcile hot path. Resources the fetcher
    /// reports gone are left out.
    pub async fn values(&self) -> HelmsmanResult<Vec<R>> {
        let keys = self.store.keys()?;
        let mut values = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(value) = self.store.get(key).await? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Number of resources believed to exist.
    pub fn size(&self) -> HelmsmanResult<usize> {
        self.store.len()
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.store.stats()
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &BoundedStore<String, R, C, F> {
        &self.store
    }
}

impl<R, C, F> ResourcePresence for BoundedItemStore<R, C, F>
where
    R: Resource + Clone + Send + Sync,
    C: BoundedCache<String, R>,
    F: ResourceFetcher<String, R>,
{
    /// Existence-set lookup under the default key composition. A poisoned
    /// store reports every resource present.
    fn contains(&self, id: &ResourceId) -> bool {
        self.store.contains_key(&id.key()).unwrap_or(true)
    }
}
