use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::events::LifecyclePhase;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetricsSnapshot {
    pub submitted_total: u64,
    pub dispatched_total: u64,
    pub completed_total: u64,
    pub failed_total: u64,
    pub aborted_total: u64,
    pub timeout_total: u64,
    pub pending_depth: u64,
    pub active_count: u64,
    pub events_dropped: u64,
}

/// Queue counters used for snapshots and admission assertions in tests.
/// All counters are lock-free atomics; hot paths must remain O(1).
pub(crate) struct QueueMetrics {
    submitted_total: AtomicU64,
    dispatched_total: AtomicU64,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    aborted_total: AtomicU64,
    timeout_total: AtomicU64,
    pending_depth: AtomicU64,
    active_count: AtomicU64,
    events_dropped: AtomicU64,
}

impl QueueMetrics {
    pub(crate) fn new() -> Self {
        Self {
            submitted_total: AtomicU64::new(0),
            dispatched_total: AtomicU64::new(0),
            completed_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            aborted_total: AtomicU64::new(0),
            timeout_total: AtomicU64::new(0),
            pending_depth: AtomicU64::new(0),
            active_count: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    /// Record one accepted submission now sitting in pending.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_submitted(&self) {
        self.submitted_total.fetch_add(1, Ordering::Relaxed);
        self.pending_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one pending entry handed to a transport.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_dispatched(&self) {
        self.dispatched_total.fetch_add(1, Ordering::Relaxed);
        saturating_dec(&self.pending_depth);
        self.active_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the terminal phase of one active exchange.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_terminal(&self, phase: LifecyclePhase) {
        saturating_dec(&self.active_count);
        self.bump_terminal(phase);
    }

    /// Record one pending entry resolved without ever dispatching.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_pending_resolved(&self, phase: LifecyclePhase) {
        saturating_dec(&self.pending_depth);
        self.bump_terminal(phase);
    }

    /// Record one lifecycle event nobody was subscribed to receive.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Build immutable metrics snapshot for observability/reporting.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            submitted_total: self.submitted_total.load(Ordering::Relaxed),
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            completed_total: self.completed_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            aborted_total: self.aborted_total.load(Ordering::Relaxed),
            timeout_total: self.timeout_total.load(Ordering::Relaxed),
            pending_depth: self.pending_depth.load(Ordering::Relaxed),
            active_count: self.active_count.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }

    fn bump_terminal(&self, phase: LifecyclePhase) {
        match phase {
            LifecyclePhase::Completed => {
                self.completed_total.fetch_add(1, Ordering::Relaxed);
            }
            LifecyclePhase::Failed => {
                self.failed_total.fetch_add(1, Ordering::Relaxed);
            }
            LifecyclePhase::Aborted => {
                self.aborted_total.fetch_add(1, Ordering::Relaxed);
            }
            LifecyclePhase::Timeout => {
                self.timeout_total.fetch_add(1, Ordering::Relaxed);
            }
            LifecyclePhase::Queued | LifecyclePhase::Sending | LifecyclePhase::Receiving => {}
        }
    }
}

fn saturating_dec(v: &AtomicU64) {
    let mut current = v.load(Ordering::Relaxed);
    loop {
        if current == 0 {
            return;
        }
        match v.compare_exchange_weak(current, current - 1, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(next) => current = next,
        }
    }
}
