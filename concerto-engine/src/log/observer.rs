//! Log change notifications
//!
//! The log tells an observer about every append and completion, and about
//! invocations the retention window drops. The engine installs an observer
//! that feeds its dispatcher; tests can install a collecting one.

use crate::types::InvocationId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Event emitted when the log changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    /// A pending invocation was recorded
    Appended(InvocationId),
    /// An invocation received its output
    Completed(InvocationId),
}

impl LogEvent {
    /// The invocation the event refers to
    pub fn id(&self) -> InvocationId {
        match self {
            LogEvent::Appended(id) | LogEvent::Completed(id) => *id,
        }
    }

    /// Check if this is an append event
    pub fn is_appended(&self) -> bool {
        matches!(self, LogEvent::Appended(_))
    }

    /// Check if this is a completion event
    pub fn is_completed(&self) -> bool {
        matches!(self, LogEvent::Completed(_))
    }
}

/// Keeps a causal chain out of the retention window while alive.
///
/// A chain is only evicted once none of its invocations is pending and no
/// hold on it remains. Dropping a hold never touches the log lock.
#[derive(Debug, Default)]
pub struct ChainHold(Arc<AtomicUsize>);

impl ChainHold {
    pub(crate) fn on(holds: &Arc<AtomicUsize>) -> Self {
        holds.fetch_add(1, Ordering::AcqRel);
        ChainHold(Arc::clone(holds))
    }
}

impl Drop for ChainHold {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Receiver of log events.
///
/// Both methods are called while the log's write lock is held, so
/// implementations must not block or call back into the log.
pub trait LogObserver: Send + Sync {
    /// `hold` keeps the event's chain retained until it is dropped
    fn notify(&self, event: LogEvent, hold: ChainHold);

    /// The retention window dropped these invocations
    fn evicted(&self, _ids: &[InvocationId]) {}
}

/// An observer that records every event, for tests and diagnostics
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<LogEvent>>,
    evicted: Mutex<Vec<InvocationId>>,
}

impl CollectingObserver {
    /// Create a new collecting observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the collected events, leaving the observer empty
    pub fn take(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Take the ids reported as evicted
    pub fn take_evicted(&self) -> Vec<InvocationId> {
        std::mem::take(&mut *self.evicted.lock())
    }
}

impl LogObserver for CollectingObserver {
    fn notify(&self, event: LogEvent, _hold: ChainHold) {
        self.events.lock().push(event);
    }

    fn evicted(&self, ids: &[InvocationId]) {
        self.evicted.lock().extend_from_slice(ids);
    }
}
