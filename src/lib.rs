//! # fetch-query
//!
//! A Rust library for batched, deduplicated, concurrent data fetching.
//!
//! Describe a computation over remote data (databases, web services, etc.) as
//! a composable [`Fetch`] value, then execute it. The interpreter analyzes
//! the description so that:
//!
//! - independent requests to the same data source coalesce into one batch,
//! - independent requests to distinct sources run in parallel in one round,
//! - every distinct identity is fetched at most once per execution, mediated
//!   by a caller-supplied cache.
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use fetch_query::{fetch, traverse, DataSource, NonEmpty, Query};
//!
//! struct Users;
//!
//! impl DataSource for Users {
//!     type Identity = u32;
//!     type Value = String;
//!
//!     fn name(&self) -> String {
//!         "users".to_string()
//!     }
//!
//!     fn fetch_one(&self, id: u32) -> Query<Option<String>> {
//!         Query::now(Some(format!("user {id}")))
//!     }
//!
//!     fn fetch_many(&self, ids: NonEmpty<u32>) -> Query<HashMap<u32, String>> {
//!         // One round trip for the whole batch.
//!         Query::now(ids.into_iter().map(|id| (id, format!("user {id}"))).collect())
//!     }
//! }
//!
//! # async fn demo() -> fetch_query::Result<()> {
//! let users = Arc::new(Users);
//!
//! // The three requests share one batched round.
//! let names = traverse(vec![1, 2, 3], |id| fetch(&users, id)).run().await?;
//! assert_eq!(names.len(), 3);
//!
//! // A dependent fetch runs in a second round, after the first resolves.
//! let chained = fetch(&users, 1).flat_map({
//!     let users = Arc::clone(&users);
//!     move |name| fetch(&users, name.len() as u32)
//! });
//! let value = chained.run().await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```
//!
//! ## Observing execution
//!
//! [`Fetch::run_env`] returns the [`Env`]: the final cache plus a log of the
//! rounds performed, with per-source identity breakdowns, cache-hit flags,
//! and batch counts.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Cache protocol and the default persistent in-memory cache
pub mod cache;
/// Execution environment: cache plus round log
pub mod env;
/// Error types and result definitions
pub mod error;
/// Fetch descriptions and combinators
pub mod fetch;
/// Deferred computations returned by data sources
pub mod query;
/// The data-source contract
pub mod source;

mod plan;
mod runner;

// Re-export main types
pub use cache::{CacheKey, CachedValue, FetchCache, InMemoryCache, cache_results};
pub use env::{Env, Round, RoundKind};
pub use error::{FetchError, Result};
pub use fetch::{Fetch, error, fetch, pure, sequence, traverse};
pub use query::{Query, QueryCompleter};
pub use source::{DataSource, Identity, NonEmpty};
