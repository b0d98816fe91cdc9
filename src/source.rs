//! The data-source contract and the erased request machinery behind it.
//!
//! A [`DataSource`] resolves identities to values, one at a time or in
//! batches. The planner only talks to sources through [`ErasedSource`], which
//! hides the concrete identity/value types so requests against arbitrarily
//! many sources can share one round.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::CachedValue;
use crate::error::{FetchError, Result};
use crate::query::Query;

/// Caller-supplied handle to a remote record.
///
/// Blanket-implemented; any value that is cloneable, hashable, and
/// serializable qualifies. The stable key used for caching and deduplication
/// is the canonical JSON serialization of the value.
pub trait Identity: Clone + Eq + Hash + fmt::Debug + Serialize + Send + Sync + 'static {}

impl<T> Identity for T where T: Clone + Eq + Hash + fmt::Debug + Serialize + Send + Sync + 'static {}

/// Stable, deterministic key for an identity within its source.
pub(crate) fn identity_key<I: Identity>(id: &I) -> String {
    match serde_json::to_string(id) {
        Ok(key) => key,
        Err(_) => format!("{id:?}"),
    }
}

/// A non-empty collection of identities, as handed to [`DataSource::fetch_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmpty<T> {
    head: T,
    tail: Vec<T>,
}

impl<T> NonEmpty<T> {
    /// A single-element collection
    pub fn new(head: T) -> Self {
        Self { head, tail: Vec::new() }
    }

    /// Build from a vector; `None` if the vector is empty
    pub fn from_vec(mut items: Vec<T>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let head = items.remove(0);
        Some(Self { head, tail: items })
    }

    /// Append an element
    pub fn push(&mut self, item: T) {
        self.tail.push(item);
    }

    /// Number of elements; always at least one
    pub fn len(&self) -> usize {
        1 + self.tail.len()
    }

    /// Always `false`
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The first element
    pub fn head(&self) -> &T {
        &self.head
    }

    /// Iterate over all elements
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.head).chain(self.tail.iter())
    }

    /// Consume into a plain vector
    pub fn into_vec(self) -> Vec<T> {
        let mut items = Vec::with_capacity(1 + self.tail.len());
        items.push(self.head);
        items.extend(self.tail);
        items
    }
}

impl<T> IntoIterator for NonEmpty<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

/// A user-implemented resolver from identities to values.
///
/// Implementations must keep `name` stable: it namespaces the cache and lets
/// the planner recognize the same source across disparate parts of a fetch
/// description. `fetch_many` over a single identity must agree with
/// `fetch_one` on that identity.
///
/// ```
/// use std::collections::HashMap;
/// use fetch_query::{DataSource, NonEmpty, Query};
///
/// struct Doubler;
///
/// impl DataSource for Doubler {
///     type Identity = i32;
///     type Value = i32;
///
///     fn name(&self) -> String {
///         "doubler".to_string()
///     }
///
///     fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
///         Query::now(Some(id * 2))
///     }
///
///     fn fetch_many(&self, ids: NonEmpty<i32>) -> Query<HashMap<i32, i32>> {
///         Query::now(ids.into_iter().map(|id| (id, id * 2)).collect())
///     }
/// }
/// ```
pub trait DataSource: Send + Sync + 'static {
    /// The identity type this source resolves
    type Identity: Identity;
    /// The value type this source produces
    type Value: Clone + Send + Sync + 'static;

    /// Stable name of the source
    fn name(&self) -> String;

    /// Resolve a single identity. `None` means the identity does not exist,
    /// which the interpreter treats as a hard failure.
    fn fetch_one(&self, id: Self::Identity) -> Query<Option<Self::Value>>;

    /// Resolve a batch of identities. Identities absent from the returned map
    /// are treated as missing.
    ///
    /// The default implementation fans out to `fetch_one` concurrently, so
    /// sources without a batch endpoint still participate in batched rounds.
    fn fetch_many(
        &self,
        ids: NonEmpty<Self::Identity>,
    ) -> Query<HashMap<Self::Identity, Self::Value>> {
        let pairs: Vec<(Self::Identity, Query<Option<Self::Value>>)> = ids
            .into_iter()
            .map(|id| {
                let query = self.fetch_one(id.clone());
                (id, query)
            })
            .collect();
        Query::future(async move {
            let resolved = future::try_join_all(pairs.into_iter().map(|(id, query)| async move {
                Ok::<_, FetchError>((id, query.run().await?))
            }))
            .await?;
            let mut found = HashMap::with_capacity(resolved.len());
            for (id, value) in resolved {
                if let Some(value) = value {
                    found.insert(id, value);
                }
            }
            Ok(found)
        })
    }

    /// Upper bound on identities per `fetch_many` call. When `Some(n)`, the
    /// interpreter splits a round's identity set for this source into chunks
    /// of at most `n` and dispatches the chunks concurrently.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}

/// An identity with its concrete type erased, tagged by its stable key.
#[derive(Clone)]
pub(crate) struct ErasedIdentity {
    pub(crate) key: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl ErasedIdentity {
    pub(crate) fn new<I: Identity>(id: I) -> Self {
        Self {
            key: identity_key(&id),
            value: Arc::new(id),
        }
    }

    fn downcast<I: Identity>(&self) -> Result<I> {
        self.value.downcast_ref::<I>().cloned().ok_or_else(|| {
            FetchError::Internal(format!("identity type mismatch for key {}", self.key))
        })
    }
}

impl fmt::Debug for ErasedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErasedIdentity").field(&self.key).finish()
    }
}

/// Shared cell a round writes a fetched value into; the continuation of the
/// leaf that registered it reads it back out.
#[derive(Clone)]
pub(crate) struct ResultSlot(Arc<Mutex<Option<CachedValue>>>);

impl ResultSlot {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    pub(crate) fn fill(&self, value: CachedValue) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = Some(value);
        }
    }

    pub(crate) fn take_typed<V: Clone + Send + Sync + 'static>(&self) -> Result<V> {
        let taken = match self.0.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match taken {
            Some(any) => match any.downcast::<V>() {
                Ok(value) => Ok((*value).clone()),
                Err(_) => Err(FetchError::Internal(
                    "fetched value type mismatch at continuation".to_string(),
                )),
            },
            None => Err(FetchError::Internal(
                "request resumed before its result was available".to_string(),
            )),
        }
    }
}

/// One pending leaf request: an erased identity against an erased source,
/// plus the slot its result flows back through.
pub(crate) struct PendingRequest {
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) identity: ErasedIdentity,
    pub(crate) slot: ResultSlot,
}

/// Object-safe view of a [`DataSource`] used by the planner and interpreter.
pub(crate) trait ErasedSource: Send + Sync {
    fn name(&self) -> String;

    fn max_batch_size(&self) -> Option<usize>;

    /// Fetch a round's worth of identities, chunked per `max_batch_size`.
    /// Returns fetched values keyed by stable identity key; requested
    /// identities may be absent (the interpreter decides what that means).
    fn run_batch(
        &self,
        ids: Vec<ErasedIdentity>,
    ) -> BoxFuture<'static, Result<HashMap<String, CachedValue>>>;
}

pub(crate) struct SourceHandle<S: DataSource> {
    source: Arc<S>,
}

impl<S: DataSource> SourceHandle<S> {
    pub(crate) fn new(source: Arc<S>) -> Self {
        Self { source }
    }
}

impl<S: DataSource> ErasedSource for SourceHandle<S> {
    fn name(&self) -> String {
        self.source.name()
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.source.max_batch_size()
    }

    fn run_batch(
        &self,
        ids: Vec<ErasedIdentity>,
    ) -> BoxFuture<'static, Result<HashMap<String, CachedValue>>> {
        let source = Arc::clone(&self.source);
        Box::pin(async move {
            let mut typed = Vec::with_capacity(ids.len());
            for id in &ids {
                typed.push(id.downcast::<S::Identity>()?);
            }
            let chunk_size = match source.max_batch_size() {
                Some(limit) if limit > 0 => limit,
                _ => typed.len().max(1),
            };
            let chunks: Vec<Vec<S::Identity>> = typed.chunks(chunk_size).map(<[_]>::to_vec).collect();
            let calls = chunks.into_iter().map(|chunk| {
                let source = Arc::clone(&source);
                async move { run_chunk(source, chunk).await }
            });
            let maps = future::try_join_all(calls).await?;
            let mut merged = HashMap::new();
            for map in maps {
                merged.extend(map);
            }
            Ok(merged)
        })
    }
}

async fn run_chunk<S: DataSource>(
    source: Arc<S>,
    chunk: Vec<S::Identity>,
) -> Result<HashMap<String, CachedValue>> {
    let mut results = HashMap::with_capacity(chunk.len());
    if chunk.len() == 1 {
        let id = chunk.into_iter().next().ok_or_else(|| {
            FetchError::Internal("empty chunk dispatched to source".to_string())
        })?;
        debug!(source = %source.name(), identity = %identity_key(&id), "fetching single identity");
        if let Some(value) = source.fetch_one(id.clone()).run().await? {
            results.insert(identity_key(&id), Arc::new(value) as CachedValue);
        }
    } else {
        let ids = NonEmpty::from_vec(chunk).ok_or_else(|| {
            FetchError::Internal("empty chunk dispatched to source".to_string())
        })?;
        info!(source = %source.name(), count = ids.len(), "fetching batch");
        for (id, value) in source.fetch_many(ids).run().await? {
            results.insert(identity_key(&id), Arc::new(value) as CachedValue);
        }
    }
    Ok(results)
}
