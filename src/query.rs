//! Deferred, possibly-failing computations returned by data sources.
//!
//! A [`Query`] is a pure description of how to obtain a value; nothing runs
//! until the interpreter executes it during a round. Sources choose whichever
//! variant fits their backend: an immediate value, a synchronous thunk (run on
//! the blocking pool), or a future.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::{FetchError, Result};

/// A deferred computation producing a `T`.
pub enum Query<T> {
    /// An already-computed value
    Now(T),
    /// A synchronous thunk; executed on the blocking pool
    Sync(Box<dyn FnOnce() -> Result<T> + Send>),
    /// An asynchronous computation
    Future(BoxFuture<'static, Result<T>>),
}

impl<T: Send + 'static> Query<T> {
    /// Lift an already-computed value
    pub fn now(value: T) -> Self {
        Self::Now(value)
    }

    /// Defer a synchronous, possibly-blocking computation.
    ///
    /// The thunk runs on the blocking thread pool when the query executes, so
    /// it may perform blocking I/O without stalling the round.
    pub fn from_fn(f: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self::Sync(Box::new(f))
    }

    /// Defer an asynchronous computation
    pub fn future(fut: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        Self::Future(Box::pin(fut))
    }

    /// Build a query from a callback-style API.
    ///
    /// `register` is invoked when the query executes and receives a
    /// [`QueryCompleter`]; the first call to [`QueryCompleter::complete`] or
    /// [`QueryCompleter::fail`] resolves the query, later calls are no-ops.
    ///
    /// ```
    /// use fetch_query::Query;
    ///
    /// let query: Query<u32> = Query::callback(|completer| {
    ///     completer.complete(42);
    ///     completer.complete(7); // ignored, first completion wins
    /// });
    /// ```
    pub fn callback(register: impl FnOnce(QueryCompleter<T>) + Send + 'static) -> Self {
        Self::Future(Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            register(QueryCompleter {
                sender: Arc::new(Mutex::new(Some(tx))),
            });
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Internal(
                    "query completer dropped before completion".to_string(),
                )),
            }
        }))
    }

    /// Transform the produced value
    pub fn map<U, F>(self, f: F) -> Query<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Self::Now(value) => Query::Now(f(value)),
            Self::Sync(thunk) => Query::Sync(Box::new(move || thunk().map(f))),
            Self::Future(fut) => Query::Future(Box::pin(async move { fut.await.map(f) })),
        }
    }

    /// Chain a dependent query
    pub fn and_then<U, F>(self, f: F) -> Query<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Query<U> + Send + 'static,
    {
        match self {
            Self::Now(value) => f(value),
            other => Query::Future(Box::pin(async move { f(other.run().await?).run().await })),
        }
    }

    /// Execute the query. Sync thunks run on the blocking pool.
    pub(crate) async fn run(self) -> Result<T> {
        match self {
            Self::Now(value) => Ok(value),
            Self::Sync(thunk) => match tokio::task::spawn_blocking(thunk).await {
                Ok(result) => result,
                Err(join_error) => Err(FetchError::Internal(format!(
                    "blocking query task failed: {join_error}"
                ))),
            },
            Self::Future(fut) => fut.await,
        }
    }
}

/// Resolves a [`Query::callback`] query. First completion wins.
pub struct QueryCompleter<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
}

impl<T> Clone for QueryCompleter<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: Send + 'static> QueryCompleter<T> {
    /// Resolve the query with a value. No-op if already resolved.
    pub fn complete(&self, value: T) {
        self.finish(Ok(value));
    }

    /// Resolve the query with an error. No-op if already resolved.
    pub fn fail(&self, error: FetchError) {
        self.finish(Err(error));
    }

    fn finish(&self, result: Result<T>) {
        if let Ok(mut guard) = self.sender.lock()
            && let Some(sender) = guard.take()
        {
            let _ = sender.send(result);
        }
    }
}
