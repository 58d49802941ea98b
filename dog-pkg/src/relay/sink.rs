use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::types::{ExitKind, JobId, PackageId, PackageInfo, WorkerEvent, WorkerState};

/// Message carried from workers to the relay task
pub type RelayMessage = (JobId, WorkerEvent);

/// Owned handle a worker uses to report events for its job
///
/// Every event is tagged with the job id the sink was created for. Events
/// sent through one sink reach subscribers in the order they were sent.
#[derive(Debug, Clone)]
pub struct EventSink {
    job_id: JobId,
    tx: mpsc::UnboundedSender<RelayMessage>,
}

impl EventSink {
    pub(crate) fn new(job_id: JobId, tx: mpsc::UnboundedSender<RelayMessage>) -> Self {
        Self { job_id, tx }
    }

    /// Create a sink detached from any engine, with the receiving end
    ///
    /// Useful for exercising a worker on its own.
    pub fn channel(job_id: JobId) -> (Self, mpsc::UnboundedReceiver<RelayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(job_id, tx), rx)
    }

    /// Job this sink reports for
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Send an event; returns false once the engine is gone
    pub fn emit(&self, event: WorkerEvent) -> bool {
        trace!(job_id = %self.job_id, ?event, "worker event");
        self.tx.send((self.job_id, event)).is_ok()
    }

    pub fn status_changed(&self, state: WorkerState, package: Option<PackageId>) -> bool {
        self.emit(WorkerEvent::StatusChanged { state, package })
    }

    /// Report progress; values above 100 are clamped
    pub fn progress_changed(&self, percentage: u8) -> bool {
        let percentage = if percentage > 100 {
            warn!(job_id = %self.job_id, percentage, "progress above 100, clamping");
            100
        } else {
            percentage
        };
        self.emit(WorkerEvent::ProgressChanged { percentage })
    }

    pub fn packages_found(&self, packages: Vec<PackageInfo>) -> bool {
        self.emit(WorkerEvent::PackagesFound { packages })
    }

    /// Report the end of the job; must be sent exactly once
    pub fn finished(&self, exit: ExitKind) -> bool {
        self.emit(WorkerEvent::Finished { exit })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
