//! Round planning: extract the frontier of a description and group its
//! requests by data source.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FetchError;
use crate::fetch::{Cont, Fetch, Node};
use crate::source::{ErasedIdentity, ErasedSource, PendingRequest, ResultSlot};

/// All requests against one source in the current round. Identities are
/// distinct (deduplicated by stable key, first appearance order preserved);
/// every slot registered for a key receives the fetched value, so duplicate
/// leaves share one fetch.
pub(crate) struct SourceGroup {
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) name: String,
    pub(crate) identities: Vec<ErasedIdentity>,
    pub(crate) slots: HashMap<String, Vec<ResultSlot>>,
}

/// What the interpreter should do next with a description.
pub(crate) enum RoundPlan<T> {
    Done(T),
    Failed(FetchError),
    Dispatch {
        groups: Vec<SourceGroup>,
        cont: Cont<T>,
    },
}

/// Walk the root of a description without executing continuations.
pub(crate) fn plan_round<T: Send + 'static>(fetch: Fetch<T>) -> RoundPlan<T> {
    match fetch.node {
        Node::Done(value) => RoundPlan::Done(value),
        Node::Error(error) => RoundPlan::Failed(error),
        Node::Blocked(request, cont) => RoundPlan::Dispatch {
            groups: group_requests(vec![request]),
            cont,
        },
        Node::Concurrent(requests, cont) => RoundPlan::Dispatch {
            groups: group_requests(requests),
            cont,
        },
    }
}

fn group_requests(requests: Vec<PendingRequest>) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for request in requests {
        let name = request.source.name();
        let position = match by_name.get(&name) {
            Some(position) => *position,
            None => {
                groups.push(SourceGroup {
                    source: Arc::clone(&request.source),
                    name: name.clone(),
                    identities: Vec::new(),
                    slots: HashMap::new(),
                });
                by_name.insert(name, groups.len() - 1);
                groups.len() - 1
            }
        };

        let group = &mut groups[position];
        let key = request.identity.key.clone();
        if !group.slots.contains_key(&key) {
            group.identities.push(request.identity.clone());
            group.slots.insert(key.clone(), Vec::new());
        }
        if let Some(waiting) = group.slots.get_mut(&key) {
            waiting.push(request.slot);
        }
    }

    groups
}
