use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{PackageWorker, WorkerFactory};
use crate::relay::EventSink;
use crate::types::{ExitKind, JobId, Operation, PackageId, PackageInfo, WorkerState};

type HandleTable = Mutex<BTreeMap<JobId, ManualHandle>>;

#[derive(Debug)]
struct ManualState {
    state: WorkerState,
    package: Option<PackageId>,
    operation: Option<Operation>,
    cancel_requested: bool,
}

/// Worker whose progress is driven from outside through a [`ManualHandle`]
///
/// `start` records the operation and reports the running state; everything
/// after that (progress, results, the final `finished`) is up to whoever
/// holds the handle. Handy for tests and for bridging a backend that lives
/// behind another interface.
pub struct ManualWorker {
    shared: Arc<Mutex<ManualState>>,
    sink: EventSink,
}

impl ManualWorker {
    pub fn new(sink: EventSink) -> (Self, ManualHandle) {
        let shared = Arc::new(Mutex::new(ManualState {
            state: WorkerState::Idle,
            package: None,
            operation: None,
            cancel_requested: false,
        }));
        let handle = ManualHandle {
            shared: shared.clone(),
            sink: sink.clone(),
            table: None,
        };
        (Self { shared, sink }, handle)
    }
}

impl PackageWorker for ManualWorker {
    fn start(&self, operation: Operation) {
        let mut shared = self.shared.lock();
        if shared.operation.is_some() {
            warn!(job_id = %self.sink.job_id(), "worker started twice, ignoring");
            return;
        }
        let state = WorkerState::Running(operation.kind());
        let package = operation.packages().first().cloned();
        shared.state = state;
        shared.package = package.clone();
        shared.operation = Some(operation);
        self.sink.status_changed(state, package);
    }

    fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    fn subject_package(&self) -> Option<PackageId> {
        self.shared.lock().package.clone()
    }

    fn cancel(&self) -> bool {
        let mut shared = self.shared.lock();
        if shared.state.is_finished() {
            return false;
        }
        shared.cancel_requested = true;
        debug!(job_id = %self.sink.job_id(), "cancellation requested");
        true
    }
}

/// Caller-side control of a [`ManualWorker`]
#[derive(Clone)]
pub struct ManualHandle {
    shared: Arc<Mutex<ManualState>>,
    sink: EventSink,
    /// Factory table holding this handle, pruned on finish
    table: Option<Weak<HandleTable>>,
}

impl ManualHandle {
    pub fn job_id(&self) -> JobId {
        self.sink.job_id()
    }

    /// Operation passed to `start`, if it has been started
    pub fn operation(&self) -> Option<Operation> {
        self.shared.lock().operation.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    pub fn cancel_requested(&self) -> bool {
        self.shared.lock().cancel_requested
    }

    /// Change the reported state and subject package
    pub fn set_status(&self, state: WorkerState, package: Option<PackageId>) {
        {
            let mut shared = self.shared.lock();
            shared.state = state;
            shared.package = package.clone();
        }
        self.sink.status_changed(state, package);
    }

    pub fn progress(&self, percentage: u8) {
        self.sink.progress_changed(percentage);
    }

    pub fn packages(&self, packages: Vec<PackageInfo>) {
        self.sink.packages_found(packages);
    }

    /// Finish the job; returns false if it already finished
    ///
    /// A handle created by [`ManualWorkerFactory`] is dropped from the
    /// factory at this point.
    pub fn finish(&self, exit: ExitKind) -> bool {
        {
            let mut shared = self.shared.lock();
            if shared.state.is_finished() {
                return false;
            }
            shared.state = WorkerState::Finished(exit);
        }
        self.sink.finished(exit);

        if let Some(table) = self.table.as_ref().and_then(Weak::upgrade) {
            table.lock().remove(&self.job_id());
        }
        true
    }
}

/// Factory producing [`ManualWorker`]s and keeping their handles by job id
///
/// Handles stay available until their job finishes or they are taken out
/// with [`take`](Self::take).
#[derive(Default)]
pub struct ManualWorkerFactory {
    handles: Arc<HandleTable>,
    created: AtomicUsize,
}

impl ManualWorkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, job_id: JobId) -> Option<ManualHandle> {
        self.handles.lock().get(&job_id).cloned()
    }

    /// Remove a handle from the factory, handing it to the caller
    pub fn take(&self, job_id: JobId) -> Option<ManualHandle> {
        let mut handle = self.handles.lock().remove(&job_id)?;
        handle.table = None;
        Some(handle)
    }

    /// Handle of the most recently created worker that is still held
    pub fn last(&self) -> Option<ManualHandle> {
        self.handles
            .lock()
            .last_key_value()
            .map(|(_, handle)| handle.clone())
    }

    /// Number of workers created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of handles still held for unfinished jobs
    pub fn live(&self) -> usize {
        self.handles.lock().len()
    }
}

impl WorkerFactory for ManualWorkerFactory {
    fn create(&self, job_id: JobId, sink: EventSink) -> Box<dyn PackageWorker> {
        let (worker, mut handle) = ManualWorker::new(sink);
        handle.table = Some(Arc::downgrade(&self.handles));
        self.handles.lock().insert(job_id, handle);
        self.created.fetch_add(1, Ordering::Relaxed);
        Box::new(worker)
    }
}
