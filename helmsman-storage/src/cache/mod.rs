//! Bounded resource cache with existence tracking.
//!
//! The bounded cache may evict any entry at any time. The store remembers
//! which keys exist independently of the cache, so an evicted entry is
//! transparently refetched while a key that was never `put` (or was
//! `remove`d) is answered locally without touching the fetcher.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(MokaBoundedCache::from_config(&config.cache));
//! let store = BoundedItemStore::new(cache, Arc::new(api_fetcher));
//!
//! // Event layer
//! store.put_resource(pod)?;
//!
//! // Reconciler; refetches if the pod was evicted
//! let pod = store.get("default/web").await?;
//! ```

pub mod bounded_store;
pub mod item_store;
pub mod moka_backend;
pub mod traits;

pub use bounded_store::BoundedStore;
pub use item_store::{namespace_key_fn, BoundedItemStore, KeyFn};
pub use moka_backend::MokaBoundedCache;
pub use traits::{BoundedCache, ResourceFetcher, StoreStats, StoreStatsSnapshot};
