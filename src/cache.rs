//! The cache protocol and the default in-memory implementation.
//!
//! Caches are functional: `update` returns a new cache and never mutates the
//! receiver. The interpreter threads the cache through execution, so an
//! environment captured inside a failure is a true snapshot. Custom caches
//! (layered, forgetful, bounded) implement [`FetchCache`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rpds::HashTrieMapSync;
use serde::{Deserialize, Serialize};

use crate::source::{DataSource, identity_key};

/// A cached result value with its concrete type erased
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Global key of an identity: the source name plus the identity's stable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Stable name of the data source
    pub source: String,
    /// Canonical serialization of the identity
    pub identity: String,
}

impl CacheKey {
    /// Build a key from a source name and an identity key
    pub fn new(source: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            identity: identity.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.identity)
    }
}

/// Functional store of already-resolved `(source, identity) -> value` pairs.
pub trait FetchCache: Send + Sync {
    /// Look up a previously-updated key
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Produce a new cache reflecting the write. Implementations that discard
    /// the write (a forgetful cache) force a refetch on every reference; the
    /// interpreter keeps no private memo.
    fn update(&self, key: CacheKey, value: CachedValue) -> Arc<dyn FetchCache>;
}

/// Batch-insert typed results for one source into a cache.
///
/// Convenience for pre-populating a cache before a run:
///
/// ```
/// use std::sync::Arc;
/// use fetch_query::{cache_results, DataSource, FetchCache, InMemoryCache, Query};
///
/// struct Users;
/// impl DataSource for Users {
///     type Identity = u32;
///     type Value = String;
///     fn name(&self) -> String { "users".to_string() }
///     fn fetch_one(&self, id: u32) -> Query<Option<String>> {
///         Query::now(Some(format!("user {id}")))
///     }
/// }
///
/// let cache: Arc<dyn FetchCache> = Arc::new(InMemoryCache::new());
/// let cache = cache_results(&cache, &Users, vec![(1, "alice".to_string())]);
/// ```
pub fn cache_results<S: DataSource>(
    cache: &Arc<dyn FetchCache>,
    source: &S,
    results: impl IntoIterator<Item = (S::Identity, S::Value)>,
) -> Arc<dyn FetchCache> {
    let name = source.name();
    let mut cache = Arc::clone(cache);
    for (id, value) in results {
        let key = CacheKey::new(name.clone(), identity_key(&id));
        cache = cache.update(key, Arc::new(value));
    }
    cache
}

/// The default cache: an immutable persistent map with structural sharing,
/// so updates are cheap and old handles stay valid snapshots.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: HashTrieMapSync<CacheKey, CachedValue>,
}

impl InMemoryCache {
    /// An empty cache
    pub fn new() -> Self {
        Self {
            entries: HashTrieMapSync::new_sync(),
        }
    }

    /// Number of cached values
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    /// Whether the cache holds no values
    pub fn is_empty(&self) -> bool {
        self.entries.size() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.entries.size())
            .finish()
    }
}

impl FetchCache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.get(key).cloned()
    }

    fn update(&self, key: CacheKey, value: CachedValue) -> Arc<dyn FetchCache> {
        Arc::new(Self {
            entries: self.entries.insert(key, value),
        })
    }
}
