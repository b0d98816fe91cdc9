//! The execution environment: the cache and the append-only round log.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::FetchCache;

/// The shape of one interpreter round, with the identities involved.
///
/// Identities are recorded by their stable keys (canonical JSON), in the
/// order they first appeared in the frontier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundKind {
    /// A single identity against a single source
    One {
        /// Source name
        source: String,
        /// Stable key of the identity
        identity: String,
    },
    /// Multiple identities against a single source
    Many {
        /// Source name
        source: String,
        /// Stable keys of the distinct identities
        identities: Vec<String>,
    },
    /// Identities against multiple sources, fetched in parallel
    Concurrent {
        /// Per-source identity breakdown
        sources: BTreeMap<String, Vec<String>>,
    },
}

/// Record of one interpreter step: a parallel wave of source calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// When the round was planned
    pub start: DateTime<Utc>,
    /// When the round's results were merged
    pub end: DateTime<Utc>,
    /// Source/identity breakdown of the frontier
    pub kind: RoundKind,
    /// True if every identity was served from the cache
    pub cached: bool,
    /// Identities actually dispatched to sources (cache misses)
    pub fetched: usize,
    /// Number of multi-identity source calls made
    pub batches: usize,
}

/// A cache and a round log, threaded through execution.
#[derive(Clone)]
pub struct Env {
    cache: Arc<dyn FetchCache>,
    rounds: Vec<Round>,
}

impl Env {
    pub(crate) fn new(cache: Arc<dyn FetchCache>) -> Self {
        Self {
            cache,
            rounds: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, round: Round) {
        self.rounds.push(round);
    }

    pub(crate) fn set_cache(&mut self, cache: Arc<dyn FetchCache>) {
        self.cache = cache;
    }

    /// The cache as of the last completed round
    pub fn cache(&self) -> &Arc<dyn FetchCache> {
        &self.cache
    }

    /// The rounds performed so far, in execution order
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Total identities dispatched to data sources across all rounds
    pub fn total_fetched(&self) -> usize {
        self.rounds.iter().map(|round| round.fetched).sum()
    }

    /// Total multi-identity source calls across all rounds
    pub fn batch_count(&self) -> usize {
        self.rounds.iter().map(|round| round.batches).sum()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}
