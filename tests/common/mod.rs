//! Instrumented data sources and caches shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fetch_query::{CacheKey, CachedValue, DataSource, FetchCache, NonEmpty, Query};

/// Call counters so tests can assert batching, deduplication, and cache
/// behavior from the source's point of view.
#[derive(Default)]
pub struct Counters {
    one_calls: AtomicUsize,
    many_calls: AtomicUsize,
    fetched: AtomicUsize,
}

impl Counters {
    pub fn record_one(&self) {
        self.one_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_many(&self, count: usize) {
        self.many_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.fetch_add(count, Ordering::SeqCst);
    }

    pub fn one_calls(&self) -> usize {
        self.one_calls.load(Ordering::SeqCst)
    }

    pub fn many_calls(&self) -> usize {
        self.many_calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }
}

/// Resolves every `i32` to itself. Supports batching.
#[derive(Default)]
pub struct IntSource {
    pub counters: Counters,
}

impl DataSource for IntSource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "ints".to_string()
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        self.counters.record_one();
        Query::now(Some(id))
    }

    fn fetch_many(&self, ids: NonEmpty<i32>) -> Query<HashMap<i32, i32>> {
        self.counters.record_many(ids.len());
        Query::now(ids.into_iter().map(|id| (id, id)).collect())
    }
}

/// Resolves an `i32` to its decimal string.
#[derive(Default)]
pub struct ToStringSource {
    pub counters: Counters,
}

impl DataSource for ToStringSource {
    type Identity = i32;
    type Value = String;

    fn name(&self) -> String {
        "to-string".to_string()
    }

    fn fetch_one(&self, id: i32) -> Query<Option<String>> {
        self.counters.record_one();
        Query::now(Some(id.to_string()))
    }

    fn fetch_many(&self, ids: NonEmpty<i32>) -> Query<HashMap<i32, String>> {
        self.counters.record_many(ids.len());
        Query::now(ids.into_iter().map(|id| (id, id.to_string())).collect())
    }
}

/// Resolves a `String` to its length.
#[derive(Default)]
pub struct LengthSource {
    pub counters: Counters,
}

impl DataSource for LengthSource {
    type Identity = String;
    type Value = usize;

    fn name(&self) -> String {
        "length".to_string()
    }

    fn fetch_one(&self, id: String) -> Query<Option<usize>> {
        self.counters.record_one();
        Query::now(Some(id.len()))
    }

    fn fetch_many(&self, ids: NonEmpty<String>) -> Query<HashMap<String, usize>> {
        self.counters.record_many(ids.len());
        Query::now(ids.into_iter().map(|id| {
            let len = id.len();
            (id, len)
        }).collect())
    }
}

/// Has no data: every lookup comes back empty.
#[derive(Default)]
pub struct NeverSource;

impl DataSource for NeverSource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "never".to_string()
    }

    fn fetch_one(&self, _id: i32) -> Query<Option<i32>> {
        Query::now(None)
    }

    fn fetch_many(&self, _ids: NonEmpty<i32>) -> Query<HashMap<i32, i32>> {
        Query::now(HashMap::new())
    }
}

/// Accepts at most two identities per batch call.
#[derive(Default)]
pub struct LimitedSource {
    pub counters: Counters,
}

impl DataSource for LimitedSource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "limited".to_string()
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        self.counters.record_one();
        Query::now(Some(id))
    }

    fn fetch_many(&self, ids: NonEmpty<i32>) -> Query<HashMap<i32, i32>> {
        assert!(ids.len() <= 2, "batch exceeded the declared limit");
        self.counters.record_many(ids.len());
        Query::now(ids.into_iter().map(|id| (id, id)).collect())
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(2)
    }
}

/// Implements only `fetch_one`; batches arrive through the default
/// `fetch_many` fan-out.
#[derive(Default)]
pub struct OneOnlySource {
    pub counters: Counters,
}

impl DataSource for OneOnlySource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "one-only".to_string()
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        self.counters.record_one();
        Query::now(Some(id))
    }
}

/// Resolves through a callback-style API.
#[derive(Default)]
pub struct CallbackSource {
    pub counters: Counters,
}

impl DataSource for CallbackSource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "callback".to_string()
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        self.counters.record_one();
        Query::callback(move |completer| completer.complete(Some(id * 10)))
    }
}

/// Fails every query with a source error.
#[derive(Default)]
pub struct FailingSource;

impl DataSource for FailingSource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "failing".to_string()
    }

    fn fetch_one(&self, _id: i32) -> Query<Option<i32>> {
        Query::from_fn(|| {
            Err(fetch_query::FetchError::Source {
                source_name: "failing".to_string(),
                message: "backend unavailable".to_string(),
            })
        })
    }
}

/// Returns every requested identity plus an identity nobody asked for.
#[derive(Default)]
pub struct ChattySource;

impl DataSource for ChattySource {
    type Identity = i32;
    type Value = i32;

    fn name(&self) -> String {
        "chatty".to_string()
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        Query::now(Some(id))
    }

    fn fetch_many(&self, ids: NonEmpty<i32>) -> Query<HashMap<i32, i32>> {
        let mut results: HashMap<i32, i32> = ids.into_iter().map(|id| (id, id)).collect();
        results.insert(99, 99);
        Query::now(results)
    }
}

/// A cache that discards every write: each reference must be refetched.
pub struct ForgetfulCache;

impl FetchCache for ForgetfulCache {
    fn get(&self, _key: &CacheKey) -> Option<CachedValue> {
        None
    }

    fn update(&self, _key: CacheKey, _value: CachedValue) -> Arc<dyn FetchCache> {
        Arc::new(Self)
    }
}
