//! Integration tests for the bounded item store: fetch-on-miss, existence
//! tracking, and the put/remove races against in-flight fetches.

use std::collections::HashMap;
use std::sync::Arc;

use helmsman_storage::{BoundedCache, BoundedItemStore};
use helmsman_test_utils::fixtures::{cluster_resource, test_resource_1, test_resource_2};
use helmsman_test_utils::{
    assertions, init_tracing, FetchGate, MockBoundedCache, MockFetcher, TestResource,
};
use proptest::prelude::*;

type Cache = MockBoundedCache<String, TestResource>;
type Fetcher = MockFetcher<String, TestResource>;
type Store = BoundedItemStore<TestResource, Cache, Fetcher>;

fn setup() -> (Arc<Store>, Arc<Cache>, Arc<Fetcher>) {
    init_tracing();
    let cache = Arc::new(Cache::new());
    let fetcher = Arc::new(Fetcher::new());
    let store = Arc::new(BoundedItemStore::new(
        Arc::clone(&cache),
        Arc::clone(&fetcher),
    ));
    (store, cache, fetcher)
}

fn gated_setup() -> (Arc<Store>, Arc<Cache>, Arc<Fetcher>, Arc<FetchGate>) {
    init_tracing();
    let gate = FetchGate::new();
    let cache = Arc::new(Cache::new());
    let fetcher = Arc::new(Fetcher::new().with_gate(Arc::clone(&gate)));
    let store = Arc::new(BoundedItemStore::new(
        Arc::clone(&cache),
        Arc::clone(&fetcher),
    ));
    (store, cache, fetcher, gate)
}

// ============================================================================
// FETCH-ON-MISS
// ============================================================================

#[tokio::test]
async fn unknown_resource_is_not_fetched() {
    let (store, _cache, fetcher) = setup();

    let res = store.get(&test_resource_1().key()).await.unwrap();

    assert!(res.is_none());
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn evicted_resource_is_fetched_once() {
    let (store, cache, fetcher) = setup();
    let resource = test_resource_1();
    store.put_resource(resource.clone()).unwrap();
    cache.evict(&resource.key());
    fetcher.insert(resource.key(), resource.clone());

    assert_eq!(store.get(&resource.key()).await.unwrap(), Some(resource.clone()));
    assert_eq!(store.get(&resource.key()).await.unwrap(), Some(resource));
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn resource_missing_on_server_leaves_store() {
    let (store, cache, _fetcher) = setup();
    let resource = test_resource_1();
    store.put_resource(resource.clone()).unwrap();
    cache.evict(&resource.key());

    assert!(store.get(&resource.key()).await.unwrap().is_none());
    assert!(store.key_set().unwrap().is_empty());
    assert_eq!(store.stats().gone, 1);
}

#[tokio::test]
async fn removed_resource_is_absent_without_fetch() {
    let (store, _cache, fetcher) = setup();
    let resource = test_resource_1();
    store.put_resource(resource.clone()).unwrap();

    store.remove(&resource.key()).unwrap();

    assert!(store.get(&resource.key()).await.unwrap().is_none());
    assert!(store.key_set().unwrap().is_empty());
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn fetch_failure_propagates_and_is_retried() {
    let (store, cache, fetcher) = setup();
    let resource = test_resource_1();
    store.put_resource(resource.clone()).unwrap();
    cache.evict(&resource.key());
    fetcher.fail_with("connection refused");

    assertions::assert_fetch_failed(&store.get(&resource.key()).await);
    assert_eq!(store.size().unwrap(), 1);

    fetcher.succeed();
    fetcher.insert(resource.key(), resource.clone());
    assert_eq!(store.get(&resource.key()).await.unwrap(), Some(resource));
    assert_eq!(fetcher.call_count(), 2);
}

// ============================================================================
// LISTING
// ============================================================================

#[test]
fn reading_key_set_does_not_read_bounded_cache() {
    let (store, cache, _fetcher) = setup();
    store.put_resource(test_resource_1()).unwrap();
    store.put_resource(cluster_resource()).unwrap();

    let mut keys = store.key_set().unwrap();
    keys.sort();

    assert_eq!(keys, vec!["default/test1".to_string(), "node-1".to_string()]);
    assert_eq!(store.size().unwrap(), 2);
    assert_eq!(cache.get_call_count(), 0);
}

#[tokio::test]
async fn values_fetch_only_evicted_resources() {
    let (store, cache, fetcher) = setup();
    let first = test_resource_1();
    let second = test_resource_2();
    store.put_resource(first.clone()).unwrap();
    store.put_resource(second.clone()).unwrap();
    cache.evict(&second.key());
    fetcher.insert(second.key(), second.clone());

    let mut values = store.values().await.unwrap();
    values.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(values, vec![first, second]);
    assert_eq!(fetcher.call_count(), 1);
}

// ============================================================================
// RACES AGAINST IN-FLIGHT FETCHES
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn put_during_fetch_wins_over_fetched_value() {
    let (store, cache, fetcher, gate) = gated_setup();
    let stale = test_resource_1().with_version(1);
    let fresh = test_resource_1().with_version(2);
    let key = stale.key();

    store.put_resource(stale.clone()).unwrap();
    cache.evict(&key);
    fetcher.insert(key.clone(), stale);

    let reader = {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    gate.wait_entered().await;
    store.put_resource(fresh.clone()).unwrap();
    gate.release();

    let seen = reader.await.unwrap().unwrap();
    assert_eq!(seen, Some(fresh.clone()));
    assert_eq!(cache.get(&key), Some(fresh.clone()));
    assert_eq!(store.stats().discarded, 1);

    // The cached fresh value now serves reads without another fetch.
    assert_eq!(store.get(&key).await.unwrap(), Some(fresh));
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_during_fetch_is_not_resurrected() {
    let (store, cache, fetcher, gate) = gated_setup();
    let resource = test_resource_1();
    let key = resource.key();

    store.put_resource(resource.clone()).unwrap();
    cache.evict(&key);
    fetcher.insert(key.clone(), resource);

    let reader = {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    gate.wait_entered().await;
    store.remove(&key).unwrap();
    gate.release();

    assert_eq!(reader.await.unwrap().unwrap(), None);
    assert!(cache.is_empty());
    assert!(store.key_set().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn put_during_gone_fetch_keeps_resource() {
    let (store, cache, _fetcher, gate) = gated_setup();
    let resource = test_resource_1();
    let key = resource.key();

    store.put_resource(resource.clone()).unwrap();
    cache.evict(&key);

    let reader = {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    gate.wait_entered().await;
    let recreated = resource.with_version(5);
    store.put_resource(recreated.clone()).unwrap();
    gate.release();

    assert_eq!(reader.await.unwrap().unwrap(), Some(recreated));
    assert_eq!(store.size().unwrap(), 1);
    assert_eq!(store.stats().gone, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rewrite_and_evict_during_fetch_refetches() {
    let (store, cache, fetcher, gate) = gated_setup();
    let stale = test_resource_1().with_version(1);
    let fresh = test_resource_1().with_version(2);
    let key = stale.key();

    store.put_resource(stale.clone()).unwrap();
    cache.evict(&key);
    fetcher.insert(key.clone(), stale);

    let reader = {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    gate.wait_entered().await;
    store.put_resource(fresh.clone()).unwrap();
    fetcher.insert(key.clone(), fresh.clone());
    cache.evict(&key);
    gate.release();

    // The first result is stale and dropped; a second fetch runs.
    gate.wait_entered().await;
    gate.release();

    assert_eq!(reader.await.unwrap().unwrap(), Some(fresh.clone()));
    assert_eq!(cache.get(&key), Some(fresh));
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(store.stats().discarded, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_and_recreate_during_fetch_refetches() {
    let (store, cache, fetcher, gate) = gated_setup();
    let original = test_resource_1().with_version(1);
    let recreated = test_resource_1().with_version(7);
    let key = original.key();

    store.put_resource(original.clone()).unwrap();
    cache.evict(&key);
    fetcher.insert(key.clone(), original);

    let reader = {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    gate.wait_entered().await;
    store.remove(&key).unwrap();
    store.put_resource(recreated.clone()).unwrap();
    fetcher.insert(key.clone(), recreated.clone());
    cache.evict(&key);
    gate.release();

    gate.wait_entered().await;
    gate.release();

    assert_eq!(reader.await.unwrap().unwrap(), Some(recreated));
    assert_eq!(store.size().unwrap(), 1);
}

// ============================================================================
// SINGLE FETCH PER MISS
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_misses_share_one_fetch() {
    let (store, cache, fetcher, gate) = gated_setup();
    let resource = test_resource_1();
    let key = resource.key();

    store.put_resource(resource.clone()).unwrap();
    cache.evict(&key);
    fetcher.insert(key.clone(), resource.clone());

    let spawn_get = || {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    let first = spawn_get();
    gate.wait_entered().await;
    let second = spawn_get();
    while store.stats().coalesced == 0 {
        tokio::task::yield_now().await;
    }
    gate.release();

    assert_eq!(first.await.unwrap().unwrap(), Some(resource.clone()));
    assert_eq!(second.await.unwrap().unwrap(), Some(resource));
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(store.stats().fetches, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_fetch_failure_reaches_all_callers_and_is_retried() {
    let (store, cache, fetcher, gate) = gated_setup();
    let resource = test_resource_1();
    let key = resource.key();

    store.put_resource(resource.clone()).unwrap();
    cache.evict(&key);
    fetcher.fail_with("connection reset");

    let spawn_get = || {
        let store = Arc::clone(&store);
        let key = key.clone();
        tokio::spawn(async move { store.get(&key).await })
    };
    let first = spawn_get();
    gate.wait_entered().await;
    let second = spawn_get();
    while store.stats().coalesced == 0 {
        tokio::task::yield_now().await;
    }
    gate.release();

    assertions::assert_fetch_failed(&first.await.unwrap());
    assertions::assert_fetch_failed(&second.await.unwrap());
    assert_eq!(fetcher.call_count(), 1);

    fetcher.succeed();
    fetcher.insert(key.clone(), resource.clone());
    gate.release();
    assert_eq!(store.get(&key).await.unwrap(), Some(resource));
    assert_eq!(fetcher.call_count(), 2);
}

// ============================================================================
// MODEL CHECK
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u64),
    Remove(u8),
    Evict(u8),
    Get(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 1u64..100).prop_map(|(k, v)| Op::Put(k, v)),
        (0u8..4).prop_map(Op::Remove),
        (0u8..4).prop_map(Op::Evict),
        (0u8..4).prop_map(Op::Get),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// With a server that always mirrors the last `put`, every read returns
    /// the last value put for an existing key, and a fetch happens only for
    /// existing keys missing from the cache.
    #[test]
    fn reads_follow_last_put(ops in proptest::collection::vec(arb_op(), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (store, cache, fetcher) = setup();
        let mut model: HashMap<String, TestResource> = HashMap::new();
        let mut expected_fetches = 0usize;

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let resource = TestResource::namespaced("ns", format!("r{k}")).with_version(v);
                    fetcher.insert(resource.key(), resource.clone());
                    store.put_resource(resource.clone()).unwrap();
                    model.insert(resource.key(), resource);
                }
                Op::Remove(k) => {
                    let key = format!("ns/r{k}");
                    fetcher.remove(&key);
                    store.remove(&key).unwrap();
                    model.remove(&key);
                }
                Op::Evict(k) => cache.evict(&format!("ns/r{k}")),
                Op::Get(k) => {
                    let key = format!("ns/r{k}");
                    if model.contains_key(&key) && cache.get(&key).is_none() {
                        expected_fetches += 1;
                    }
                    let got = runtime.block_on(store.get(&key)).unwrap();
                    prop_assert_eq!(got.as_ref(), model.get(&key));
                }
            }
        }

        prop_assert_eq!(fetcher.call_count(), expected_fetches);
        let mut keys = store.key_set().unwrap();
        keys.sort();
        let mut model_keys: Vec<String> = model.keys().cloned().collect();
        model_keys.sort();
        prop_assert_eq!(keys, model_keys);
    }
}
