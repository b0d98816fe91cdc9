//! Cache threading: hits suppress dispatch, writes survive rounds, and
//! caches that discard writes force refetching.

mod common;

use std::sync::Arc;

use common::{ForgetfulCache, IntSource};
use fetch_query::{CacheKey, FetchCache, InMemoryCache, RoundKind, cache_results, fetch};

#[tokio::test]
async fn second_reference_is_served_from_cache() {
    let ints = Arc::new(IntSource::default());

    let description = fetch(&ints, 1).flat_map({
        let ints = Arc::clone(&ints);
        move |_| fetch(&ints, 1)
    });
    let (env, value) = description.run_env().await.unwrap();

    assert_eq!(value, 1);
    assert_eq!(env.rounds().len(), 2);
    let second = &env.rounds()[1];
    assert!(second.cached);
    assert_eq!(second.fetched, 0);
    assert_eq!(env.total_fetched(), 1);
    assert_eq!(ints.counters.one_calls(), 1);
}

#[tokio::test]
async fn prepopulated_cache_suppresses_all_dispatch() {
    let ints = Arc::new(IntSource::default());

    let cache: Arc<dyn FetchCache> = Arc::new(InMemoryCache::new());
    let cache = cache_results(&cache, &*ints, vec![(1, 1), (2, 2)]);

    let description = fetch(&ints, 1).join(fetch(&ints, 2));
    let (env, value) = description.run_env_with_cache(cache).await.unwrap();

    assert_eq!(value, (1, 2));
    assert_eq!(ints.counters.one_calls(), 0);
    assert_eq!(ints.counters.many_calls(), 0);
    // The round is still logged, flagged as fully cached.
    assert_eq!(env.rounds().len(), 1);
    assert!(env.rounds()[0].cached);
    assert_eq!(env.total_fetched(), 0);
}

#[tokio::test]
async fn partially_cached_round_fetches_only_the_missing() {
    let ints = Arc::new(IntSource::default());

    let description = fetch(&ints, 1).join(fetch(&ints, 2)).flat_map({
        let ints = Arc::clone(&ints);
        move |_| fetch(&ints, 2).join(fetch(&ints, 3))
    });
    let (env, value) = description.run_env().await.unwrap();

    assert_eq!(value, (2, 3));
    assert_eq!(env.rounds().len(), 2);
    let second = &env.rounds()[1];
    assert!(!second.cached);
    assert_eq!(second.fetched, 1);
    // Identity 2 came from the cache, so only 3 reached the source.
    assert_eq!(ints.counters.fetched(), 3);
}

#[tokio::test]
async fn fetched_values_are_visible_in_the_final_cache() {
    let ints = Arc::new(IntSource::default());

    let (env, _) = fetch(&ints, 5).run_env().await.unwrap();

    let cached = env.cache().get(&CacheKey::new("ints", "5")).unwrap();
    assert_eq!(*cached.downcast::<i32>().unwrap(), 5);
    assert!(env.cache().get(&CacheKey::new("ints", "6")).is_none());
}

#[tokio::test]
async fn forgetful_cache_forces_a_refetch_per_reference() {
    let ints = Arc::new(IntSource::default());

    let description = fetch(&ints, 1).flat_map({
        let ints = Arc::clone(&ints);
        move |_| fetch(&ints, 1)
    });
    let (env, value) = description
        .run_env_with_cache(Arc::new(ForgetfulCache))
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert_eq!(env.rounds().len(), 2);
    for round in env.rounds() {
        assert!(!round.cached);
        assert_eq!(round.fetched, 1);
        assert!(matches!(round.kind, RoundKind::One { .. }));
    }
    assert_eq!(ints.counters.one_calls(), 2);
    assert_eq!(env.total_fetched(), 2);
}
