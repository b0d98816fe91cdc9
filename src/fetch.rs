//! The fetch description tree and its combinators.
//!
//! A [`Fetch`] is an immutable description of a computation over remote data.
//! Combinators never execute anything; they rearrange the tree so that the
//! interpreter can see, at every step, the full frontier of requests that may
//! run in one round. `flat_map` expresses a strict data dependency and always
//! sequences; `join`, [`sequence`], and [`traverse`] keep independent
//! requests side by side so they batch and parallelize.

use std::sync::Arc;

use crate::error::FetchError;
use crate::source::{DataSource, ErasedIdentity, PendingRequest, ResultSlot, SourceHandle};

/// Continuation from "results available" back into a description. Results are
/// not passed as arguments; they arrive through the slots captured in the
/// continuation's leaves.
pub(crate) type Cont<T> = Box<dyn FnOnce() -> Fetch<T> + Send>;

pub(crate) enum Node<T> {
    /// A resolved pure value
    Done(T),
    /// A lifted failure
    Error(FetchError),
    /// One request that, once fulfilled, feeds the continuation
    Blocked(PendingRequest, Cont<T>),
    /// Independent requests that may all run in the same round
    Concurrent(Vec<PendingRequest>, Cont<T>),
}

/// An immutable description of a computation over remote data.
///
/// Build descriptions with [`fetch`], [`pure`], and [`error`]; compose them
/// with [`Fetch::map`], [`Fetch::flat_map`], and [`Fetch::join`]; execute
/// them with [`Fetch::run`](crate::Fetch::run) and its variants.
pub struct Fetch<T> {
    pub(crate) node: Node<T>,
}

impl<T: Send + 'static> Fetch<T> {
    /// Lift a pure value; produces no round
    pub fn pure(value: T) -> Self {
        Self {
            node: Node::Done(value),
        }
    }

    pub(crate) fn from_error(error: FetchError) -> Self {
        Self {
            node: Node::Error(error),
        }
    }

    /// Whether this description has resolved to a value
    pub fn is_done(&self) -> bool {
        matches!(self.node, Node::Done(_))
    }

    /// Whether this description has resolved to a failure
    pub fn is_error(&self) -> bool {
        matches!(self.node, Node::Error(_))
    }

    /// Transform the produced value
    pub fn map<U, F>(self, f: F) -> Fetch<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self.node {
            Node::Done(value) => Fetch::pure(f(value)),
            Node::Error(error) => Fetch::from_error(error),
            Node::Blocked(request, cont) => Fetch {
                node: Node::Blocked(request, Box::new(move || cont().map(f))),
            },
            Node::Concurrent(requests, cont) => Fetch {
                node: Node::Concurrent(requests, Box::new(move || cont().map(f))),
            },
        }
    }

    /// Monadic bind: a strict data dependency.
    ///
    /// The description returned by `f` cannot begin until this one has
    /// produced its value, so the two never share a round.
    pub fn flat_map<U, F>(self, f: F) -> Fetch<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fetch<U> + Send + 'static,
    {
        match self.node {
            Node::Done(value) => f(value),
            Node::Error(error) => Fetch::from_error(error),
            Node::Blocked(request, cont) => Fetch {
                node: Node::Blocked(request, Box::new(move || cont().flat_map(f))),
            },
            Node::Concurrent(requests, cont) => Fetch {
                node: Node::Concurrent(requests, Box::new(move || cont().flat_map(f))),
            },
        }
    }

    /// Applicative product: combine two independent descriptions.
    ///
    /// Pending requests from both sides merge into one frontier, so requests
    /// to the same source batch and requests to distinct sources run in
    /// parallel within a single round. Results are paired positionally.
    pub fn join<U: Send + 'static>(self, other: Fetch<U>) -> Fetch<(T, U)> {
        match (self.node, other.node) {
            (Node::Error(error), _) | (_, Node::Error(error)) => Fetch::from_error(error),
            (Node::Done(left), Node::Done(right)) => Fetch::pure((left, right)),
            (Node::Done(left), Node::Blocked(request, cont)) => Fetch {
                node: Node::Blocked(
                    request,
                    Box::new(move || cont().map(move |right| (left, right))),
                ),
            },
            (Node::Done(left), Node::Concurrent(requests, cont)) => Fetch {
                node: Node::Concurrent(
                    requests,
                    Box::new(move || cont().map(move |right| (left, right))),
                ),
            },
            (Node::Blocked(request, cont), Node::Done(right)) => Fetch {
                node: Node::Blocked(
                    request,
                    Box::new(move || cont().map(move |left| (left, right))),
                ),
            },
            (Node::Concurrent(requests, cont), Node::Done(right)) => Fetch {
                node: Node::Concurrent(
                    requests,
                    Box::new(move || cont().map(move |left| (left, right))),
                ),
            },
            (Node::Blocked(left_request, left_cont), Node::Blocked(right_request, right_cont)) => {
                Fetch {
                    node: Node::Concurrent(
                        vec![left_request, right_request],
                        Box::new(move || left_cont().join(right_cont())),
                    ),
                }
            }
            (Node::Blocked(left_request, left_cont), Node::Concurrent(mut requests, right_cont)) => {
                requests.insert(0, left_request);
                Fetch {
                    node: Node::Concurrent(
                        requests,
                        Box::new(move || left_cont().join(right_cont())),
                    ),
                }
            }
            (Node::Concurrent(mut requests, left_cont), Node::Blocked(right_request, right_cont)) => {
                requests.push(right_request);
                Fetch {
                    node: Node::Concurrent(
                        requests,
                        Box::new(move || left_cont().join(right_cont())),
                    ),
                }
            }
            (Node::Concurrent(mut requests, left_cont), Node::Concurrent(right_requests, right_cont)) => {
                requests.extend(right_requests);
                Fetch {
                    node: Node::Concurrent(
                        requests,
                        Box::new(move || left_cont().join(right_cont())),
                    ),
                }
            }
        }
    }
}

/// Lift a pure value into a description
pub fn pure<T: Send + 'static>(value: T) -> Fetch<T> {
    Fetch::pure(value)
}

/// Lift a failure into a description
pub fn error<T: Send + 'static>(error: impl Into<anyhow::Error>) -> Fetch<T> {
    Fetch::from_error(FetchError::app(error))
}

/// Describe fetching one identity from a source.
///
/// ```
/// use std::sync::Arc;
/// use fetch_query::{fetch, DataSource, Query};
///
/// struct Squares;
/// impl DataSource for Squares {
///     type Identity = i32;
///     type Value = i32;
///     fn name(&self) -> String { "squares".to_string() }
///     fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
///         Query::now(Some(id * id))
///     }
/// }
///
/// # async fn demo() -> fetch_query::Result<()> {
/// let squares = Arc::new(Squares);
/// let description = fetch(&squares, 3).join(fetch(&squares, 4));
/// let (nine, sixteen) = description.run().await?;
/// assert_eq!((nine, sixteen), (9, 16));
/// # Ok(())
/// # }
/// ```
pub fn fetch<S: DataSource>(source: &Arc<S>, id: S::Identity) -> Fetch<S::Value> {
    let slot = ResultSlot::new();
    let request = PendingRequest {
        source: Arc::new(SourceHandle::new(Arc::clone(source))),
        identity: ErasedIdentity::new(id),
        slot: slot.clone(),
    };
    Fetch {
        node: Node::Blocked(
            request,
            Box::new(move || match slot.take_typed::<S::Value>() {
                Ok(value) => Fetch::pure(value),
                Err(error) => Fetch::from_error(error),
            }),
        ),
    }
}

/// Collapse a list of descriptions into one, keeping all their requests in a
/// single frontier. Folds with `join`, never with `flat_map`, so the whole
/// list resolves in as few rounds as its data dependencies allow.
pub fn sequence<T: Send + 'static>(fetches: Vec<Fetch<T>>) -> Fetch<Vec<T>> {
    fetches
        .into_iter()
        .fold(Fetch::pure(Vec::new()), |acc, next| {
            acc.join(next).map(|(mut values, value)| {
                values.push(value);
                values
            })
        })
}

/// Describe fetching a derived description for every item, batched like
/// [`sequence`].
pub fn traverse<I, T, F>(items: impl IntoIterator<Item = I>, f: F) -> Fetch<Vec<T>>
where
    T: Send + 'static,
    F: FnMut(I) -> Fetch<T>,
{
    sequence(items.into_iter().map(f).collect())
}
