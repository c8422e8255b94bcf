use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use etude::cache::{CacheError, FetchOptions, QueryCache, QueryKey};
use etude::gateway::GatewayError;

fn key(resource: &str, page: u32) -> QueryKey {
    QueryKey::new(resource).with("page", page)
}

fn options(stale_ms: u64, gc_ms: u64) -> FetchOptions {
    FetchOptions {
        stale_time: Duration::from_millis(stale_ms),
        gc_time: Duration::from_millis(gc_ms),
    }
}

#[tokio::test]
async fn test_fresh_hit_skips_fetcher() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let value = cache
            .fetch::<u32, _, _>(key("students", 1), options(60_000, 60_000), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .await
            .unwrap();
        assert_eq!(*value, 7);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_at_most_one_in_flight_per_key() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(99u32)
        }
    };

    let (a, b) = tokio::join!(
        cache.fetch::<u32, _, _>(key("students", 1), options(60_000, 60_000), fetcher(Arc::clone(&calls))),
        cache.fetch::<u32, _, _>(key("students", 1), options(60_000, 60_000), fetcher(Arc::clone(&calls))),
    );

    assert_eq!(*a.unwrap(), 99);
    assert_eq!(*b.unwrap(), 99);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "coalesced callers share one fetch");
}

#[tokio::test]
async fn test_distinct_keys_fetch_independently() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for page in 1..=2 {
        let calls = Arc::clone(&calls);
        cache
            .fetch::<u32, _, _>(key("students", page), options(60_000, 60_000), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(page)
            })
            .await
            .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_entry_served_while_revalidating() {
    let cache = QueryCache::new();

    // stale_time zero: the entry is stale as soon as it lands.
    let opts = options(0, 60_000);
    cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async { Ok(1u32) })
        .await
        .unwrap();

    // A stale hit returns the old value immediately while the refetch runs.
    let second = cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(2u32)
        })
        .await
        .unwrap();
    assert_eq!(*second, 1);
    assert!(cache.is_fetching(&key("students", 1)));

    // Once the background refetch commits, the new value is visible.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let third = cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async { Ok(3u32) })
        .await
        .unwrap();
    assert_eq!(*third, 2);
}

#[tokio::test]
async fn test_invalidation_marks_matching_keys_stale() {
    let cache = QueryCache::new();
    let opts = options(60_000, 60_000);

    cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async { Ok(1u32) })
        .await
        .unwrap();
    cache
        .fetch::<u32, _, _>(key("teachers", 1), opts, || async { Ok(2u32) })
        .await
        .unwrap();

    cache.invalidate_resource("students");

    assert!(cache.peek(&key("students", 1)).unwrap().is_stale);
    assert!(!cache.peek(&key("teachers", 1)).unwrap().is_stale);

    // The stale key refetches on next access.
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = Arc::clone(&calls);
    let value = cache
        .fetch::<u32, _, _>(key("students", 1), opts, move || async move {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok(10u32)
        })
        .await
        .unwrap();
    // Stale-while-revalidate: the old value is served, the refetch runs.
    assert_eq!(*value, 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.peek(&key("students", 1)).unwrap().is_stale);
}

#[tokio::test]
async fn test_fetch_error_surfaces_and_does_not_poison_other_keys() {
    let cache = QueryCache::new();
    let opts = options(60_000, 60_000);

    let result = cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async {
            Err(GatewayError::query("boom"))
        })
        .await;
    let error = result.unwrap_err();
    assert!(matches!(error, CacheError::Fetch(_)));
    let gateway_error = error
        .as_gateway()
        .expect("fetch failures carry the underlying gateway error");
    assert!(gateway_error.to_string().contains("boom"));
    assert!(!gateway_error.is_permission());

    // Another key is untouched.
    let value = cache
        .fetch::<u32, _, _>(key("teachers", 1), opts, || async { Ok(5u32) })
        .await
        .unwrap();
    assert_eq!(*value, 5);

    // The failing key records the error and retries on next access.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = cache.peek(&key("students", 1)).unwrap();
    assert!(!snapshot.has_data);
    assert!(snapshot.last_error.is_some());

    let value = cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async { Ok(6u32) })
        .await
        .unwrap();
    assert_eq!(*value, 6);
}

#[tokio::test]
async fn test_error_keeps_previously_good_data() {
    let cache = QueryCache::new();
    let opts = options(0, 60_000);

    cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async { Ok(1u32) })
        .await
        .unwrap();

    // Stale hit: old data returned, background refetch fails.
    let value = cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async {
            Err(GatewayError::query("transient"))
        })
        .await
        .unwrap();
    assert_eq!(*value, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = cache.peek(&key("students", 1)).unwrap();
    assert!(snapshot.has_data, "failed refetch must not evict good data");
    assert!(snapshot.is_stale);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn test_prefetch_warms_key_without_waiting() {
    let cache = QueryCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = Arc::clone(&calls);

    cache.prefetch::<u32, _, _>(key("students", 2), options(60_000, 60_000), move || async move {
        calls2.fetch_add(1, Ordering::SeqCst);
        Ok(42u32)
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.peek(&key("students", 2)).unwrap().has_data);
    assert_eq!(cache.get::<u32>(&key("students", 2)).as_deref(), Some(&42));

    // A later fetch is a pure hit.
    let value = cache
        .fetch::<u32, _, _>(key("students", 2), options(60_000, 60_000), || async {
            Ok(0u32)
        })
        .await
        .unwrap();
    assert_eq!(*value, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_prefetch_is_noop_when_fresh_or_in_flight() {
    let cache = QueryCache::new();
    let opts = options(60_000, 60_000);
    let calls = Arc::new(AtomicUsize::new(0));

    let calls2 = Arc::clone(&calls);
    cache
        .fetch::<u32, _, _>(key("students", 1), opts, move || async move {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok(1u32)
        })
        .await
        .unwrap();

    let calls3 = Arc::clone(&calls);
    cache.prefetch::<u32, _, _>(key("students", 1), opts, move || async move {
        calls3.fetch_add(1, Ordering::SeqCst);
        Ok(2u32)
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sweep_evicts_unsubscribed_expired_entries() {
    let cache = QueryCache::new();

    cache
        .fetch::<u32, _, _>(key("students", 1), options(60_000, 0), || async { Ok(1u32) })
        .await
        .unwrap();
    let kept_key = key("students", 2);
    let _subscription = cache.subscribe(kept_key.clone());
    cache
        .fetch::<u32, _, _>(kept_key.clone(), options(60_000, 0), || async { Ok(2u32) })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.sweep();

    assert!(cache.peek(&key("students", 1)).is_none());
    assert!(cache.peek(&kept_key).is_some(), "subscribed entries survive");
}

#[tokio::test]
async fn test_dropping_subscription_allows_eviction() {
    let cache = QueryCache::new();
    let k = key("students", 1);

    let subscription = cache.subscribe(k.clone());
    cache
        .fetch::<u32, _, _>(k.clone(), options(60_000, 0), || async { Ok(1u32) })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.sweep();
    assert!(cache.peek(&k).is_some());

    drop(subscription);
    cache.sweep();
    assert!(cache.peek(&k).is_none());
}

#[tokio::test]
async fn test_type_mismatch_is_an_error_not_a_panic() {
    let cache = QueryCache::new();
    let opts = options(60_000, 60_000);

    cache
        .fetch::<u32, _, _>(key("students", 1), opts, || async { Ok(1u32) })
        .await
        .unwrap();

    let result = cache
        .fetch::<String, _, _>(key("students", 1), opts, || async {
            Ok("nope".to_string())
        })
        .await;
    assert!(matches!(result, Err(CacheError::TypeMismatch(_))));
}

#[tokio::test]
async fn test_invalidation_during_flight_commits_stale() {
    let cache = QueryCache::new();
    let opts = options(60_000, 60_000);
    let k = key("students", 1);

    let cache_key = k.clone();
    let fetch = cache.fetch::<u32, _, _>(cache_key, opts, || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(1u32)
    });
    let invalidate = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate_resource("students");
    };
    let (value, ()) = tokio::join!(fetch, invalidate);
    assert_eq!(*value.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = cache.peek(&k).unwrap();
    assert!(
        snapshot.is_stale,
        "a fetch overlapping an invalidation must not commit fresh"
    );
}
