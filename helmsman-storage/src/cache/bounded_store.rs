//! Bounded store with existence tracking.
//!
//! The store keeps the set of keys believed to exist separately from the
//! bounded cache holding full values. A read that misses the cache only goes
//! to the fetcher when the key is known to exist, and the fetch itself runs
//! outside any lock. Concurrent misses on one key share a single fetch.
//!
//! Every `put` stamps the key with a new generation and `remove` drops it.
//! A fetch result is committed only if the generation it started from is
//! still current, so a value delivered by `put` while a fetch was in flight
//! is never overwritten by the fetch result, even after the cache has evicted
//! that value again.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use helmsman_core::{HelmsmanResult, StoreError};
use tokio::sync::OnceCell;

use super::traits::{BoundedCache, ResourceFetcher, StoreStats, StoreStatsSnapshot};

/// Outcome of one fetch, shared by every caller that missed on the key.
type Flight<R> = Arc<OnceCell<HelmsmanResult<Option<R>>>>;

struct StoreState<K, R> {
    /// Keys that have been `put` and not `remove`d, with their generation.
    existing: HashMap<K, u64>,
    /// Fetches currently running, one per key.
    in_flight: HashMap<K, Flight<R>>,
    next_generation: u64,
}

impl<K: Eq + Hash, R> StoreState<K, R> {
    fn new() -> Self {
        Self {
            existing: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
        }
    }

    fn generation(&self, key: &K) -> Option<u64> {
        self.existing.get(key).copied()
    }

    fn mark_existing(&mut self, key: K) {
        self.next_generation += 1;
        self.existing.insert(key, self.next_generation);
    }

    /// Detach `flight` so later misses start a fresh fetch.
    fn leave(&mut self, key: &K, flight: &Flight<R>) {
        if self
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            self.in_flight.remove(key);
        }
    }
}

/// Bounded cache plus existence set with fetch-on-miss.
///
/// # Type Parameters
///
/// - `K`: key type
/// - `R`: cached value type
/// - `C`: the bounded cache holding full values
/// - `F`: the fetcher consulted for existing-but-evicted keys
pub struct BoundedStore<K, R, C, F> {
    cache: Arc<C>,
    fetcher: Arc<F>,
    /// The lock also serializes every cache mutation made by the store.
    state: Mutex<StoreState<K, R>>,
    stats: StoreStats,
    _value: PhantomData<fn() -> R>,
}

impl<K, R, C, F> BoundedStore<K, R, C, F>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
    R: Clone + Send + Sync,
    C: BoundedCache<K, R>,
    F: ResourceFetcher<K, R>,
{
    pub fn new(cache: Arc<C>, fetcher: Arc<F>) -> Self {
        Self {
            cache,
            fetcher,
            state: Mutex::new(StoreState::new()),
            stats: StoreStats::new(),
            _value: PhantomData,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState<K, R>>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Get a value, fetching it if the key exists but was evicted.
    ///
    /// Never calls the fetcher for a key that is not in the existence set.
    pub async fn get(&self, key: &K) -> HelmsmanResult<Option<R>> {
        if let Some(value) = self.cache.get(key) {
            StoreStats::incr(&self.stats.hits);
            return Ok(Some(value));
        }
        StoreStats::incr(&self.stats.misses);

        let known = self.state()?.existing.contains_key(key);
        if !known {
            return Ok(None);
        }
        self.fetch_and_cache_if_still_absent(key).await
    }

    /// Fetch a value and store it unless another writer got there first.
    ///
    /// Callers missing on the same key while a fetch is running wait for that
    /// fetch instead of starting their own. The fetch runs without holding
    /// the store lock. Once it returns, under the lock:
    /// - a value present in the cache wins and is returned, the fetch result
    ///   is dropped
    /// - a key removed while the fetch was in flight stays removed
    /// - a key rewritten and evicted again while the fetch was in flight is
    ///   fetched again
    /// - a fetch reporting the resource gone drops the key from the
    ///   existence set
    ///
    /// A fetch error is handed to every waiting caller and leaves all state
    /// untouched, so a later `get` retries.
    pub async fn fetch_and_cache_if_still_absent(&self, key: &K) -> HelmsmanResult<Option<R>> {
        let flight = self.join_flight(key)?;
        flight
            .get_or_init(|| self.fetch_and_commit(key, &flight))
            .await
            .clone()
    }

    fn join_flight(&self, key: &K) -> Result<Flight<R>, StoreError> {
        let mut state = self.state()?;
        if let Some(flight) = state.in_flight.get(key) {
            StoreStats::incr(&self.stats.coalesced);
            tracing::trace!(key = ?key, "Joining fetch already in flight");
            return Ok(Arc::clone(flight));
        }
        let flight = Arc::new(OnceCell::new());
        state.in_flight.insert(key.clone(), Arc::clone(&flight));
        Ok(flight)
    }

    async fn fetch_and_commit(&self, key: &K, flight: &Flight<R>) -> HelmsmanResult<Option<R>> {
        loop {
            let started_at = {
                let mut state = self.state()?;
                match state.generation(key) {
                    Some(generation) => generation,
                    None => {
                        state.leave(key, flight);
                        return Ok(None);
                    }
                }
            };

            tracing::debug!(key = ?key, "Fetching resource missing from bounded cache");
            StoreStats::incr(&self.stats.fetches);
            let fetched = match self.fetcher.fetch(key).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    self.state()?.leave(key, flight);
                    return Err(e);
                }
            };

            let mut state = self.state()?;
            if let Some(actual) = self.cache.get(key) {
                StoreStats::incr(&self.stats.discarded);
                tracing::debug!(key = ?key, "Discarding fetched resource, cache already populated");
                state.leave(key, flight);
                return Ok(Some(actual));
            }
            match state.generation(key) {
                None => {
                    StoreStats::incr(&self.stats.discarded);
                    tracing::debug!(key = ?key, "Discarding fetched resource, key removed during fetch");
                    state.leave(key, flight);
                    return Ok(None);
                }
                Some(current) if current != started_at => {
                    StoreStats::incr(&self.stats.discarded);
                    tracing::debug!(key = ?key, "Refetching resource rewritten during fetch");
                    continue;
                }
                Some(_) => {}
            }

            state.leave(key, flight);
            return match fetched {
                Some(value) => {
                    self.cache.put(key.clone(), value.clone());
                    Ok(Some(value))
                }
                None => {
                    state.existing.remove(key);
                    StoreStats::incr(&self.stats.gone);
                    tracing::debug!(key = ?key, "Resource no longer exists at source");
                    Ok(None)
                }
            };
        }
    }

    /// Store a value and mark the key as existing.
    ///
    /// Returns the value previously cached for the key, if any.
    pub fn put(&self, key: K, value: R) -> HelmsmanResult<Option<R>> {
        let mut state = self.state()?;
        let prior = self.cache.put(key.clone(), value);
        state.mark_existing(key);
        Ok(prior)
    }

    /// Forget a key. Later reads return `None` without fetching.
    ///
    /// Returns the value that was still cached, if any.
    pub fn remove(&self, key: &K) -> HelmsmanResult<Option<R>> {
        let mut state = self.state()?;
        state.existing.remove(key);
        Ok(self.cache.remove(key))
    }

    /// Whether the key is in the existence set. Does not touch the cache.
    pub fn contains_key(&self, key: &K) -> HelmsmanResult<bool> {
        Ok(self.state()?.existing.contains_key(key))
    }

    /// Snapshot of the existence set. Does not touch the cache.
    pub fn keys(&self) -> HelmsmanResult<Vec<K>> {
        Ok(self.state()?.existing.keys().cloned().collect())
    }

    /// Number of keys in the existence set.
    pub fn len(&self) -> HelmsmanResult<usize> {
        Ok(self.state()?.existing.len())
    }

    pub fn is_empty(&self) -> HelmsmanResult<bool> {
        Ok(self.state()?.existing.is_empty())
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get a reference to the bounded cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }
}
