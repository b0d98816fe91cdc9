//! The interpreter: drives a description round by round until it produces a
//! value or fails.
//!
//! Each iteration plans the current frontier, serves what it can from the
//! cache, dispatches the remaining identities to their sources in parallel,
//! verifies every requested identity came back, merges results into the
//! cache, records the round, and resumes the continuation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future;
use tracing::debug;

use crate::cache::{CacheKey, CachedValue, FetchCache, InMemoryCache};
use crate::env::{Env, Round, RoundKind};
use crate::error::{FetchError, Result};
use crate::fetch::Fetch;
use crate::plan::{RoundPlan, SourceGroup, plan_round};
use crate::source::ErasedIdentity;

impl<T: Send + 'static> Fetch<T> {
    /// Execute with a fresh in-memory cache, discarding the environment.
    pub async fn run(self) -> Result<T> {
        self.run_with_cache(default_cache()).await
    }

    /// Execute against a caller-supplied cache, discarding the environment.
    pub async fn run_with_cache(self, cache: Arc<dyn FetchCache>) -> Result<T> {
        let (_env, outcome) = execute(self, cache).await;
        outcome
    }

    /// Execute with a fresh in-memory cache, returning the environment.
    pub async fn run_env(self) -> Result<(Env, T)> {
        self.run_env_with_cache(default_cache()).await
    }

    /// Execute against a caller-supplied cache, returning the environment.
    pub async fn run_env_with_cache(self, cache: Arc<dyn FetchCache>) -> Result<(Env, T)> {
        let (env, outcome) = execute(self, cache).await;
        outcome.map(|value| (env, value))
    }

    /// Execute with a fresh in-memory cache, returning the environment and
    /// the terminal description (`Done` or `Error`).
    pub async fn run_fetch(self) -> (Env, Fetch<T>) {
        self.run_fetch_with_cache(default_cache()).await
    }

    /// Execute against a caller-supplied cache, returning the environment and
    /// the terminal description.
    pub async fn run_fetch_with_cache(self, cache: Arc<dyn FetchCache>) -> (Env, Fetch<T>) {
        let (env, outcome) = execute(self, cache).await;
        match outcome {
            Ok(value) => (env, Fetch::pure(value)),
            Err(error) => (env, Fetch::from_error(error)),
        }
    }
}

fn default_cache() -> Arc<dyn FetchCache> {
    Arc::new(InMemoryCache::new())
}

async fn execute<T: Send + 'static>(
    fetch: Fetch<T>,
    cache: Arc<dyn FetchCache>,
) -> (Env, Result<T>) {
    let mut env = Env::new(cache);
    let mut current = fetch;
    loop {
        match plan_round(current) {
            RoundPlan::Done(value) => return (env, Ok(value)),
            RoundPlan::Failed(error) => return (env, Err(error)),
            RoundPlan::Dispatch { groups, cont } => match run_round(groups, &mut env).await {
                Ok(()) => current = cont(),
                Err(error) => return (env, Err(error)),
            },
        }
    }
}

/// One parallel wave of source calls. On success the cache and round log in
/// `env` are advanced and every slot in the frontier is filled.
async fn run_round(groups: Vec<SourceGroup>, env: &mut Env) -> Result<()> {
    let start = Utc::now();
    debug!(sources = groups.len(), "planning round");

    // Serve what we can from the cache; collect the rest for dispatch.
    let mut dispatches: Vec<(usize, Vec<ErasedIdentity>)> = Vec::new();
    for (position, group) in groups.iter().enumerate() {
        let mut missing = Vec::new();
        for identity in &group.identities {
            let key = CacheKey::new(group.name.clone(), identity.key.clone());
            match env.cache().get(&key) {
                Some(value) => {
                    debug!(key = %key, "cache hit");
                    fill_slots(group, &identity.key, &value);
                }
                None => missing.push(identity.clone()),
            }
        }
        if !missing.is_empty() {
            dispatches.push((position, missing));
        }
    }

    let fetched: usize = dispatches.iter().map(|(_, missing)| missing.len()).sum();
    let batches: usize = dispatches
        .iter()
        .map(|(position, missing)| batch_calls(&groups[*position], missing.len()))
        .sum();

    // Dispatch all groups in parallel; the first failure wins and sibling
    // results are discarded without touching the cache.
    let calls = dispatches.iter().map(|(position, missing)| {
        let group = &groups[*position];
        group.source.run_batch(missing.clone())
    });
    let results = future::try_join_all(calls).await?;

    // Completeness check before any cache write: every requested identity
    // must have come back with a value.
    let mut absent: Vec<(String, String)> = Vec::new();
    for ((position, missing), values) in dispatches.iter().zip(&results) {
        let group = &groups[*position];
        for identity in missing {
            if !values.contains_key(&identity.key) {
                absent.push((group.name.clone(), identity.key.clone()));
            }
        }
    }
    if let Some((source_name, _)) = absent.first() {
        let source_name = source_name.clone();
        let identities = absent
            .iter()
            .filter(|(name, _)| *name == source_name)
            .map(|(_, key)| key.clone())
            .collect();
        env.record(Round {
            start,
            end: Utc::now(),
            kind: round_kind(&groups),
            cached: false,
            fetched,
            batches,
        });
        return Err(FetchError::MissingIdentities {
            source_name,
            identities,
            env: Box::new(env.clone()),
        });
    }

    // Merge results into the cache (functional update) and fill the slots.
    // Values for identities nobody requested are ignored.
    let mut cache = Arc::clone(env.cache());
    for ((position, missing), values) in dispatches.iter().zip(results) {
        let group = &groups[*position];
        for identity in missing {
            if let Some(value) = values.get(&identity.key) {
                fill_slots(group, &identity.key, value);
                let key = CacheKey::new(group.name.clone(), identity.key.clone());
                cache = cache.update(key, Arc::clone(value));
            }
        }
    }
    env.set_cache(cache);
    env.record(Round {
        start,
        end: Utc::now(),
        kind: round_kind(&groups),
        cached: fetched == 0,
        fetched,
        batches,
    });
    Ok(())
}

fn fill_slots(group: &SourceGroup, key: &str, value: &CachedValue) {
    if let Some(waiting) = group.slots.get(key) {
        for slot in waiting {
            slot.fill(Arc::clone(value));
        }
    }
}

/// How many multi-identity calls dispatching `missing` identities to this
/// group's source will make, given its batch size limit.
fn batch_calls(group: &SourceGroup, missing: usize) -> usize {
    if missing < 2 {
        return 0;
    }
    let chunk_size = match group.source.max_batch_size() {
        Some(limit) if limit > 0 => limit,
        _ => missing,
    };
    let full = missing / chunk_size;
    let remainder = missing % chunk_size;
    let mut calls = 0;
    if chunk_size >= 2 {
        calls += full;
    }
    if remainder >= 2 {
        calls += 1;
    }
    calls
}

fn round_kind(groups: &[SourceGroup]) -> RoundKind {
    match groups {
        [group] => {
            if let [identity] = group.identities.as_slice() {
                RoundKind::One {
                    source: group.name.clone(),
                    identity: identity.key.clone(),
                }
            } else {
                RoundKind::Many {
                    source: group.name.clone(),
                    identities: group.identities.iter().map(|id| id.key.clone()).collect(),
                }
            }
        }
        _ => RoundKind::Concurrent {
            sources: groups
                .iter()
                .map(|group| {
                    (
                        group.name.clone(),
                        group.identities.iter().map(|id| id.key.clone()).collect(),
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        },
    }
}
