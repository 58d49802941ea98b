use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{ExitKind, OperationKind};

/// Live counters for engine activity
pub struct EngineMetrics {
    jobs_dispatched: AtomicU64,
    conflicts_rejected: AtomicU64,
    invalid_requests: AtomicU64,
    cancel_requests: AtomicU64,
    events_relayed: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,

    // Per-operation dispatch counts
    dispatched_by_kind: Mutex<HashMap<OperationKind, u64>>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            jobs_dispatched: AtomicU64::new(0),
            conflicts_rejected: AtomicU64::new(0),
            invalid_requests: AtomicU64::new(0),
            cancel_requests: AtomicU64::new(0),
            events_relayed: AtomicU64::new(0),
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_cancelled: AtomicU64::new(0),
            dispatched_by_kind: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_dispatched(&self, kind: OperationKind) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        *self.dispatched_by_kind.lock().entry(kind).or_insert(0) += 1;
    }

    pub fn record_conflict(&self) {
        self.conflicts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancel_request(&self) {
        self.cancel_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_relayed(&self) {
        self.events_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self, exit: ExitKind) {
        let counter = match exit {
            ExitKind::Success => &self.jobs_succeeded,
            ExitKind::Failed => &self.jobs_failed,
            ExitKind::Cancelled => &self.jobs_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // Getters for global metrics
    pub fn jobs_dispatched(&self) -> u64 {
        self.jobs_dispatched.load(Ordering::Relaxed)
    }

    pub fn conflicts_rejected(&self) -> u64 {
        self.conflicts_rejected.load(Ordering::Relaxed)
    }

    pub fn invalid_requests(&self) -> u64 {
        self.invalid_requests.load(Ordering::Relaxed)
    }

    pub fn cancel_requests(&self) -> u64 {
        self.cancel_requests.load(Ordering::Relaxed)
    }

    pub fn events_relayed(&self) -> u64 {
        self.events_relayed.load(Ordering::Relaxed)
    }

    pub fn jobs_succeeded(&self) -> u64 {
        self.jobs_succeeded.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_cancelled(&self) -> u64 {
        self.jobs_cancelled.load(Ordering::Relaxed)
    }

    /// Dispatch count for one operation kind
    pub fn dispatched(&self, kind: OperationKind) -> u64 {
        self.dispatched_by_kind.lock().get(&kind).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_dispatched: self.jobs_dispatched(),
            conflicts_rejected: self.conflicts_rejected(),
            invalid_requests: self.invalid_requests(),
            cancel_requests: self.cancel_requests(),
            events_relayed: self.events_relayed(),
            jobs_succeeded: self.jobs_succeeded(),
            jobs_failed: self.jobs_failed(),
            jobs_cancelled: self.jobs_cancelled(),
            dispatched_by_kind: self.dispatched_by_kind.lock().clone(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_dispatched: u64,
    pub conflicts_rejected: u64,
    pub invalid_requests: u64,
    pub cancel_requests: u64,
    pub events_relayed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub dispatched_by_kind: HashMap<OperationKind, u64>,
}

impl MetricsSnapshot {
    /// Jobs that reported `finished`, whatever the exit
    pub fn jobs_finished(&self) -> u64 {
        self.jobs_succeeded + self.jobs_failed + self.jobs_cancelled
    }
}
