//! Engine counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters, updated from any task
#[derive(Debug, Default)]
pub struct EngineStats {
    appended: AtomicU64,
    completed: AtomicU64,
    evaluations: AtomicU64,
    frames_fired: AtomicU64,
    actions_dispatched: AtomicU64,
    duplicates_suppressed: AtomicU64,
    depth_exceeded: AtomicU64,
    unbound_variables: AtomicU64,
    invariant_violations: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_appended(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// One rule evaluated against one log event
    pub fn record_evaluation(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fired(&self) {
        self.frames_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.actions_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame whose provenance already fired its rule
    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_depth_exceeded(&self) {
        self.depth_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unbound(&self) {
        self.unbound_variables.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_violation(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            appended: self.appended.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            frames_fired: self.frames_fired.load(Ordering::Relaxed),
            actions_dispatched: self.actions_dispatched.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            depth_exceeded: self.depth_exceeded.load(Ordering::Relaxed),
            unbound_variables: self.unbound_variables.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}

/// Point-in-time view of engine activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub appended: u64,
    pub completed: u64,
    pub evaluations: u64,
    pub frames_fired: u64,
    pub actions_dispatched: u64,
    pub duplicates_suppressed: u64,
    pub depth_exceeded: u64,
    pub unbound_variables: u64,
    pub invariant_violations: u64,
    /// Invocations dropped by the retention window
    pub evicted: u64,
    /// Invocations still waiting for their output
    pub pending_invocations: usize,
    /// Callers still waiting for a respond
    pub pending_requests: usize,
    /// Rule firings remembered for deduplication
    pub firings_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = EngineStats::new();
        stats.record_appended();
        stats.record_appended();
        stats.record_duplicate();

        let snap = stats.snapshot();
        assert_eq!(snap.appended, 2);
        assert_eq!(snap.duplicates_suppressed, 1);
        assert_eq!(snap.frames_fired, 0);
    }
}
