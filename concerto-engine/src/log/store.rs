//! In-memory invocation store with a (concept, action) index
//!
//! Invocations are grouped into causal chains by their root. The retention
//! window evicts whole chains, oldest first, and only chains that are
//! settled: nothing in them is pending and nobody holds them. A live request
//! chain therefore keeps every record its later rules still join against.

use super::{ChainHold, Invocation, LogEvent, LogObserver, Output};
use crate::error::{EngineError, Result};
use crate::types::{InvocationId, Record};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Members of one causal chain
#[derive(Default)]
struct Chain {
    members: Vec<InvocationId>,
    pending: usize,
    holds: Arc<AtomicUsize>,
}

impl Chain {
    fn is_settled(&self) -> bool {
        self.pending == 0 && self.holds.load(Ordering::Acquire) == 0
    }
}

#[derive(Default)]
struct LogState {
    /// All retained invocations in creation order
    entries: BTreeMap<InvocationId, Arc<Invocation>>,
    /// concept -> action -> ids in append order
    index: HashMap<String, HashMap<String, Vec<InvocationId>>>,
    /// root -> chain, oldest root first
    chains: BTreeMap<InvocationId, Chain>,
    next_id: u64,
    pending: usize,
    evicted: u64,
}

impl LogState {
    fn index_mut(&mut self, concept: &str, action: &str) -> &mut Vec<InvocationId> {
        self.index
            .entry(concept.to_string())
            .or_default()
            .entry(action.to_string())
            .or_default()
    }

    fn remove(&mut self, id: InvocationId) -> bool {
        let Some(inv) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(ids) = self
            .index
            .get_mut(&inv.concept)
            .and_then(|actions| actions.get_mut(&inv.action))
        {
            ids.retain(|other| *other != id);
        }
        true
    }

    /// Drop the oldest settled chains until at most `capacity` invocations
    /// remain or no settled chain is left. Returns the evicted ids.
    fn evict(&mut self, capacity: usize) -> Vec<InvocationId> {
        let mut excess = self.entries.len().saturating_sub(capacity);
        if excess == 0 {
            return Vec::new();
        }

        let settled: Vec<InvocationId> = self
            .chains
            .iter()
            .filter(|(_, chain)| chain.is_settled())
            .map(|(root, _)| *root)
            .collect();

        let mut evicted = Vec::new();
        for root in settled {
            if excess == 0 {
                break;
            }
            let Some(chain) = self.chains.remove(&root) else {
                continue;
            };
            for id in chain.members {
                if self.remove(id) {
                    evicted.push(id);
                    excess = excess.saturating_sub(1);
                }
            }
        }

        self.evicted += evicted.len() as u64;
        evicted
    }
}

/// Append-only, queryable history of action calls.
///
/// `append` and `complete` are individually atomic; readers always see an
/// invocation's pending record before its completion.
pub struct InvocationLog {
    state: RwLock<LogState>,
    retention: Option<usize>,
    observer: Option<Arc<dyn LogObserver>>,
}

impl Default for InvocationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationLog {
    /// Create an unbounded log with no observer
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            retention: None,
            observer: None,
        }
    }

    /// Keep at most `capacity` invocations outside live chains
    pub fn with_retention(mut self, capacity: Option<usize>) -> Self {
        self.retention = capacity;
        self
    }

    /// Notify `observer` of every append, completion and eviction
    pub fn with_observer(mut self, observer: Arc<dyn LogObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Record a pending invocation made from outside the engine
    pub fn append(
        &self,
        concept: impl Into<String>,
        action: impl Into<String>,
        input: Record,
    ) -> InvocationId {
        self.append_caused(concept, action, input, None, 0)
    }

    /// Record a pending invocation produced by a rule firing.
    ///
    /// The invocation joins its cause's chain, or starts a new one when the
    /// cause is absent or already evicted.
    pub fn append_caused(
        &self,
        concept: impl Into<String>,
        action: impl Into<String>,
        input: Record,
        cause: Option<InvocationId>,
        depth: usize,
    ) -> InvocationId {
        let concept = concept.into();
        let action = action.into();

        let mut state = self.state.write();
        state.next_id += 1;
        let id = InvocationId(state.next_id);
        let root = cause
            .and_then(|cause| state.entries.get(&cause))
            .map(|inv| inv.root)
            .unwrap_or(id);

        state.index_mut(&concept, &action).push(id);
        state.entries.insert(
            id,
            Arc::new(Invocation {
                id,
                concept,
                action,
                input,
                output: None,
                cause,
                root,
                depth,
                created_at: Utc::now(),
                completed_at: None,
            }),
        );
        state.pending += 1;
        let chain = state.chains.entry(root).or_default();
        chain.members.push(id);
        chain.pending += 1;
        let hold = ChainHold::on(&chain.holds);

        if let Some(observer) = &self.observer {
            observer.notify(LogEvent::Appended(id), hold);
        } else {
            drop(hold);
        }
        self.compact(&mut state);
        id
    }

    /// Attach the output to a pending invocation, exactly once
    pub fn complete(&self, id: InvocationId, output: Output) -> Result<()> {
        output.validate()?;

        let mut state = self.state.write();
        let current = state
            .entries
            .get(&id)
            .ok_or(EngineError::UnknownInvocation(id))?;
        if current.is_completed() {
            return Err(EngineError::InvariantViolation(format!(
                "{id} ({}.{}) completed twice",
                current.concept, current.action
            )));
        }

        let mut completed = Invocation::clone(current);
        completed.output = Some(output);
        completed.completed_at = Some(Utc::now());
        let root = completed.root;
        state.entries.insert(id, Arc::new(completed));
        state.pending -= 1;

        let hold = state.chains.get_mut(&root).map(|chain| {
            chain.pending -= 1;
            ChainHold::on(&chain.holds)
        });
        if let Some(observer) = &self.observer {
            observer.notify(LogEvent::Completed(id), hold.unwrap_or_default());
        } else {
            drop(hold);
        }
        self.compact(&mut state);
        Ok(())
    }

    fn compact(&self, state: &mut LogState) {
        let Some(capacity) = self.retention else {
            return;
        };
        let evicted = state.evict(capacity);
        if evicted.is_empty() {
            return;
        }
        if let Some(observer) = &self.observer {
            observer.evicted(&evicted);
        }
    }

    /// Keep the chain `id` belongs to retained until the hold is dropped
    pub fn hold(&self, id: InvocationId) -> Option<ChainHold> {
        let state = self.state.read();
        let root = state.entries.get(&id)?.root;
        state.chains.get(&root).map(|chain| ChainHold::on(&chain.holds))
    }

    /// All invocations of `concept.action`, pending and completed, in append order.
    ///
    /// The returned iterator walks a snapshot; calling `scan` again restarts
    /// from the beginning and sees anything appended since.
    pub fn scan(&self, concept: &str, action: &str) -> impl Iterator<Item = Arc<Invocation>> {
        let state = self.state.read();
        let snapshot: Vec<Arc<Invocation>> = state
            .index
            .get(concept)
            .and_then(|actions| actions.get(action))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        snapshot.into_iter()
    }

    /// Look up one invocation
    pub fn get(&self, id: InvocationId) -> Option<Arc<Invocation>> {
        self.state.read().entries.get(&id).cloned()
    }

    /// Number of retained invocations
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if nothing has been retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of invocations still waiting for their output
    pub fn pending_count(&self) -> usize {
        self.state.read().pending
    }

    /// Number of invocations dropped by the retention window
    pub fn evicted_count(&self) -> u64 {
        self.state.read().evicted
    }
}
