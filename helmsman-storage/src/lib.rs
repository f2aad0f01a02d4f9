//! Helmsman Storage - Bounded Resource Cache
//!
//! Local mirror of watched resources backed by a bounded cache, with
//! fetch-on-miss for resources known to exist.

pub mod cache;

pub use cache::{
    namespace_key_fn, BoundedCache, BoundedItemStore, BoundedStore, KeyFn, MokaBoundedCache,
    ResourceFetcher, StoreStats, StoreStatsSnapshot,
};
