//! Cache backend and fetcher traits, plus store statistics.
//!
//! A [`BoundedCache`] is any capacity- or time-bounded map that may evict
//! entries on its own. A [`ResourceFetcher`] is the authoritative point lookup
//! used when an entry known to exist has been evicted.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use helmsman_core::HelmsmanResult;

/// Bounded key-value cache with its own eviction policy.
///
/// Implementations use interior synchronization; every method may be called
/// concurrently from many threads. An entry that was `put` may disappear at
/// any time without notice.
pub trait BoundedCache<K, R>: Send + Sync {
    /// Get a value, or `None` if absent or evicted.
    fn get(&self, key: &K) -> Option<R>;

    /// Insert or replace a value, returning the replaced one if still cached.
    fn put(&self, key: K, value: R) -> Option<R>;

    /// Remove a value, returning it if it was still cached.
    fn remove(&self, key: &K) -> Option<R>;
}

/// Authoritative lookup for a single resource.
///
/// `Ok(None)` means the source no longer has the resource. Errors propagate
/// unchanged to the caller of the store operation that triggered the fetch.
#[async_trait]
pub trait ResourceFetcher<K, R>: Send + Sync
where
    K: Send + Sync,
{
    async fn fetch(&self, key: &K) -> HelmsmanResult<Option<R>>;
}

/// Counters describing store activity.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Reads served from the bounded cache
    pub hits: AtomicU64,
    /// Reads that found nothing in the bounded cache
    pub misses: AtomicU64,
    /// Fetches issued for existing-but-evicted keys
    pub fetches: AtomicU64,
    /// Misses that waited on a fetch another caller had started
    pub coalesced: AtomicU64,
    /// Fetch results dropped because a newer value or a removal won
    pub discarded: AtomicU64,
    /// Fetches that reported the resource gone
    pub gone: AtomicU64,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            gone: self.gone.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub coalesced: u64,
    pub discarded: u64,
    pub gone: u64,
}

impl StoreStatsSnapshot {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
