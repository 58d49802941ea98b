//! Worker contract.
//!
//! A worker performs one backend operation for one job. The engine builds it
//! through a [`WorkerFactory`], handing over the job id and an [`EventSink`]
//! before anything runs, so no event can be emitted before the relay listens.
//! Afterwards the engine calls [`PackageWorker::start`] exactly once.
//!
//! Every worker lifecycle must end with exactly one `finished` event; that
//! event is the only signal that reclaims the job record.

pub mod manual;
pub mod simulated;

pub use manual::{ManualHandle, ManualWorker, ManualWorkerFactory};
pub use simulated::{SimulatedConfig, SimulatedWorker, SimulatedWorkerFactory};

use crate::relay::EventSink;
use crate::types::{JobId, Operation, PackageId, WorkerState};

/// One backend operation in progress
///
/// All methods are called with the engine's registry lock held and must not
/// block or call back into the engine.
pub trait PackageWorker: Send + Sync {
    /// Begin the validated operation
    ///
    /// Must return promptly and leave [`state`](Self::state) reporting
    /// `Running(operation.kind())`; the work itself continues elsewhere.
    fn start(&self, operation: Operation);

    /// Current state, asked fresh on every status query and conflict check
    fn state(&self) -> WorkerState;

    /// Package currently being acted on
    fn subject_package(&self) -> Option<PackageId>;

    /// Ask the worker to stop; returns whether the request was accepted
    ///
    /// Advisory only: the job leaves the registry when the worker reports
    /// `finished`, not when this returns.
    fn cancel(&self) -> bool;
}

/// Builds a worker for a freshly allocated job
///
/// `create` runs with the engine's registry lock held, between id allocation
/// and registration. The lock is not reentrant: a factory must not call back
/// into the engine (not even `job_list` or `job_status`) and must not block.
pub trait WorkerFactory: Send + Sync {
    fn create(&self, job_id: JobId, sink: EventSink) -> Box<dyn PackageWorker>;
}

impl<F> WorkerFactory for F
where
    F: Fn(JobId, EventSink) -> Box<dyn PackageWorker> + Send + Sync,
{
    fn create(&self, job_id: JobId, sink: EventSink) -> Box<dyn PackageWorker> {
        self(job_id, sink)
    }
}
