use std::sync::Arc;

use thiserror::Error;

use crate::env::Env;

/// Main error type for the library
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// A data source did not return a result for one or more requested
    /// identities. Carries the environment at the point of failure so callers
    /// can observe which rounds ran and what was cached before the miss.
    #[error("source '{source_name}' returned no result for identities {identities:?}")]
    MissingIdentities {
        /// Name of the source that omitted the identities
        source_name: String,
        /// Stable keys of the identities that had no result
        identities: Vec<String>,
        /// Environment snapshot including the round that exposed the miss
        env: Box<Env>,
    },

    /// A data-source query failed while executing
    #[error("source '{source_name}' failed: {message}")]
    Source {
        /// Name of the failing source
        source_name: String,
        /// Error context
        message: String,
    },

    /// An application error lifted into a fetch description
    #[error("{0}")]
    App(Arc<anyhow::Error>),

    /// An invariant of the planner was violated
    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Lift an application error into a `FetchError`
    pub fn app(error: impl Into<anyhow::Error>) -> Self {
        Self::App(Arc::new(error.into()))
    }

    /// Check if this error came from a missing identity
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingIdentities { .. })
    }

    /// The environment attached to a missing-identity failure
    pub fn env(&self) -> Option<&Env> {
        match self {
            Self::MissingIdentities { env, .. } => Some(env),
            _ => None,
        }
    }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, FetchError>;
