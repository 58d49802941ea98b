use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::{
    EngineError, EngineResult,
    job::{ConflictGuard, JobRegistry},
    observability::EngineMetrics,
    relay::{self, BoxStream, EventSink, NotificationRelay, RelayMessage},
    types::{EngineEvent, JobId, JobIdAllocator, JobStatus, Operation, OperationKind, PackageId},
    worker::WorkerFactory,
};

/// Configuration for the package engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Broadcast buffer per subscriber before it starts lagging
    pub event_capacity: usize,
    /// First job id handed out
    pub first_job_id: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            first_job_id: 1,
        }
    }
}

/// State shared between the engine handles and the relay task
pub(crate) struct EngineCore {
    pub(crate) registry: Mutex<JobRegistry>,
    pub(crate) relay: NotificationRelay,
    pub(crate) metrics: EngineMetrics,
    allocator: JobIdAllocator,
    factory: Arc<dyn WorkerFactory>,
    sink_tx: mpsc::UnboundedSender<RelayMessage>,
    config: EngineConfig,
}

/// Job registry and dispatch engine for package operations
///
/// Each operation call validates its parameters, allocates a job id, builds
/// and registers a worker, starts it and returns the id without waiting for
/// the work. Progress is observed through [`subscribe`](Self::subscribe) or
/// [`event_stream`](Self::event_stream).
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct PackageEngine {
    core: Arc<EngineCore>,
}

impl PackageEngine {
    /// Create an engine with the default configuration
    ///
    /// Spawns the relay task, so it must be called within a Tokio runtime.
    pub fn new<F>(factory: F) -> Self
    where
        F: WorkerFactory + 'static,
    {
        Self::with_config(factory, EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config<F>(factory: F, config: EngineConfig) -> Self
    where
        F: WorkerFactory + 'static,
    {
        Self::with_shared_factory(Arc::new(factory), config)
    }

    /// Create an engine around a factory the caller keeps a handle to
    pub fn with_shared_factory(factory: Arc<dyn WorkerFactory>, config: EngineConfig) -> Self {
        let relay = NotificationRelay::new(config.event_capacity);
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();

        let core = Arc::new(EngineCore {
            registry: Mutex::new(JobRegistry::new(relay.clone())),
            relay,
            metrics: EngineMetrics::new(),
            allocator: JobIdAllocator::new(config.first_job_id),
            factory,
            sink_tx,
            config,
        });

        tokio::spawn(relay::pump(sink_rx, Arc::downgrade(&core)));
        debug!("package engine started");

        Self { core }
    }

    /// Dispatch any operation as a new job
    pub fn dispatch(&self, operation: Operation) -> EngineResult<JobId> {
        self.screen(operation.kind(), operation.validate())?;
        self.launch(operation)
    }

    /// Look for available updates
    pub fn get_updates(&self) -> EngineResult<JobId> {
        self.launch(Operation::GetUpdates)
    }

    /// Update the whole system; fails with `OperationConflict` while another
    /// system update is running
    pub fn update_system(&self) -> EngineResult<JobId> {
        self.launch(Operation::UpdateSystem)
    }

    /// Search packages by name
    pub fn find_packages(&self, search: impl Into<String>) -> EngineResult<JobId> {
        self.dispatch(Operation::FindPackages {
            search: search.into(),
        })
    }

    /// Resolve the dependencies of one package
    pub fn get_dependencies(&self, package: &str) -> EngineResult<JobId> {
        let package = self.screen(OperationKind::GetDependencies, PackageId::parse(package))?;
        self.launch(Operation::GetDependencies { package })
    }

    pub fn install_packages<I, S>(&self, packages: I) -> EngineResult<JobId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages = self.screen(OperationKind::InstallPackages, PackageId::parse_list(packages))?;
        self.launch(Operation::InstallPackages { packages })
    }

    pub fn remove_packages<I, S>(&self, packages: I) -> EngineResult<JobId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages = self.screen(OperationKind::RemovePackages, PackageId::parse_list(packages))?;
        self.launch(Operation::RemovePackages { packages })
    }

    pub fn remove_packages_with_dependencies<I, S>(&self, packages: I) -> EngineResult<JobId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages = self.screen(
            OperationKind::RemovePackagesWithDependencies,
            PackageId::parse_list(packages),
        )?;
        self.launch(Operation::RemovePackagesWithDependencies { packages })
    }

    /// Ids of registered jobs in creation order
    pub fn job_list(&self) -> Vec<JobId> {
        self.core.registry.lock().list()
    }

    /// Current state of a registered job
    pub fn job_status(&self, job_id: JobId) -> EngineResult<JobStatus> {
        let registry = self.core.registry.lock();
        registry
            .lookup(job_id)
            .map(|record| record.status())
            .ok_or(EngineError::NotFound(job_id))
    }

    /// Ask a job to stop
    ///
    /// Succeeds once the request reached the worker. The job stays listed
    /// until the worker reports `finished`.
    #[instrument(skip(self))]
    pub fn cancel(&self, job_id: JobId) -> EngineResult<()> {
        let accepted = {
            let registry = self.core.registry.lock();
            let record = registry.lookup(job_id).ok_or(EngineError::NotFound(job_id))?;
            record.worker().cancel()
        };

        self.core.metrics.record_cancel_request();
        if accepted {
            info!("Cancellation requested for job {}", job_id);
        } else {
            debug!("Job {} declined cancellation", job_id);
        }
        Ok(())
    }

    /// Receive every engine event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.core.relay.subscribe()
    }

    /// Engine events as a stream
    pub fn event_stream(&self) -> BoxStream<EngineEvent> {
        self.core.relay.event_stream()
    }

    /// The id the next accepted request will receive
    pub fn next_job_id(&self) -> JobId {
        self.core.allocator.peek()
    }

    /// Get metrics
    pub fn metrics(&self) -> &EngineMetrics {
        &self.core.metrics
    }

    /// Get configuration
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Register and start a job for an operation whose parameters are valid
    #[instrument(skip(self, operation), fields(kind = %operation.kind()))]
    fn launch(&self, operation: Operation) -> EngineResult<JobId> {
        let kind = operation.kind();
        let core = &self.core;
        let mut registry = core.registry.lock();

        if let Err(err) = ConflictGuard::check(&registry, kind) {
            core.metrics.record_conflict();
            warn!("Rejected {} request: {}", kind, err);
            return Err(err);
        }

        let job_id = core.allocator.next()?;
        let sink = EventSink::new(job_id, core.sink_tx.clone());
        let worker = core.factory.create(job_id, sink);
        let record = registry.register(job_id, kind, worker)?;

        // Started under the lock so the guard never sees an unstarted update
        record.worker().start(operation);
        drop(registry);

        core.metrics.record_dispatched(kind);
        info!("Dispatched job {} ({})", job_id, kind);
        Ok(job_id)
    }

    /// Count invalid requests on their way out
    fn screen<T>(&self, kind: OperationKind, result: EngineResult<T>) -> EngineResult<T> {
        result.map_err(|err| {
            self.core.metrics.record_invalid();
            warn!("Rejected {} request: {}", kind, err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitKind, WorkerState};
    use crate::worker::ManualWorkerFactory;
    use std::time::Duration;
    use tracing_test::traced_test;

    async fn wait_for_list(rx: &mut broadcast::Receiver<EngineEvent>, expected: Vec<JobId>) {
        let wait = async {
            loop {
                if let EngineEvent::JobListChanged { job_ids, .. } = rx.recv().await.unwrap() {
                    if job_ids == expected {
                        break;
                    }
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("Timeout waiting for job list");
    }

    #[tokio::test]
    async fn test_engine_creation() {
        let engine = PackageEngine::new(ManualWorkerFactory::new());
        assert_eq!(engine.config().event_capacity, 1024);
        assert_eq!(engine.next_job_id(), JobId(1));
        assert!(engine.job_list().is_empty());
    }

    #[tokio::test]
    async fn test_custom_first_job_id() {
        let config = EngineConfig {
            first_job_id: 100,
            ..EngineConfig::default()
        };
        let engine = PackageEngine::with_config(ManualWorkerFactory::new(), config);
        assert_eq!(engine.get_updates().unwrap(), JobId(100));
        assert_eq!(engine.next_job_id(), JobId(101));
    }

    #[tokio::test]
    async fn test_dispatch_starts_worker() {
        let factory = Arc::new(ManualWorkerFactory::new());
        let engine = PackageEngine::with_shared_factory(factory.clone(), EngineConfig::default());

        let job_id = engine.install_packages(["bar"]).unwrap();
        let handle = factory.handle(job_id).unwrap();
        assert_eq!(
            handle.operation(),
            Some(Operation::InstallPackages {
                packages: vec![PackageId::parse("bar").unwrap()]
            })
        );

        let status = engine.job_status(job_id).unwrap();
        assert_eq!(status.kind, OperationKind::InstallPackages);
        assert_eq!(status.state, WorkerState::Running(OperationKind::InstallPackages));
        assert_eq!(status.status, "install");
        assert_eq!(status.package.map(|p| p.to_string()), Some("bar".to_string()));
        assert_eq!(engine.metrics().dispatched(OperationKind::InstallPackages), 1);
    }

    #[tokio::test]
    async fn test_invalid_parameters_consume_no_id() {
        let factory = Arc::new(ManualWorkerFactory::new());
        let engine = PackageEngine::with_shared_factory(factory.clone(), EngineConfig::default());

        let empty: Vec<String> = Vec::new();
        assert!(matches!(engine.find_packages("  "), Err(EngineError::InvalidParameters(_))));
        assert!(matches!(engine.get_dependencies("has space"), Err(EngineError::InvalidParameters(_))));
        assert!(matches!(engine.install_packages(empty), Err(EngineError::InvalidParameters(_))));
        assert!(matches!(
            engine.remove_packages(["a", "a"]),
            Err(EngineError::InvalidParameters(_))
        ));
        let foo = PackageId::parse("foo").unwrap();
        assert!(matches!(
            engine.dispatch(Operation::InstallPackages {
                packages: vec![foo.clone(), foo]
            }),
            Err(EngineError::InvalidParameters(_))
        ));

        assert_eq!(engine.next_job_id(), JobId(1));
        assert_eq!(factory.created(), 0);
        assert_eq!(engine.metrics().invalid_requests(), 5);
        assert_eq!(engine.get_dependencies("foo").unwrap(), JobId(1));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_conflict_is_logged_and_counted() {
        let engine = PackageEngine::new(ManualWorkerFactory::new());
        engine.update_system().unwrap();

        let err = engine.update_system().unwrap_err();
        assert_eq!(err, EngineError::update_in_progress());
        assert_eq!(engine.metrics().conflicts_rejected(), 1);
        assert!(logs_contain("a system update is already in progress"));
    }

    #[tokio::test]
    async fn test_cancel_is_advisory() {
        let factory = Arc::new(ManualWorkerFactory::new());
        let engine = PackageEngine::with_shared_factory(factory.clone(), EngineConfig::default());
        let mut rx = engine.subscribe();

        let job_id = engine.remove_packages_with_dependencies(["foo"]).unwrap();
        engine.cancel(job_id).unwrap();

        let handle = factory.handle(job_id).unwrap();
        assert!(handle.cancel_requested());
        assert_eq!(engine.job_list(), vec![job_id], "cancel does not reap the job");

        handle.finish(ExitKind::Cancelled);
        wait_for_list(&mut rx, vec![]).await;
        assert_eq!(engine.cancel(job_id), Err(EngineError::NotFound(job_id)));
        assert_eq!(engine.metrics().jobs_cancelled(), 1);
        assert_eq!(engine.metrics().cancel_requests(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_ids_build_no_worker() {
        let factory = Arc::new(ManualWorkerFactory::new());
        let config = EngineConfig {
            first_job_id: u64::MAX - 1,
            ..EngineConfig::default()
        };
        let engine = PackageEngine::with_shared_factory(factory.clone(), config);

        let last = engine.get_updates().unwrap();
        assert_eq!(last, JobId(u64::MAX - 1));

        assert!(matches!(engine.get_updates(), Err(EngineError::Internal(_))));
        assert!(matches!(engine.find_packages("vim"), Err(EngineError::Internal(_))));
        assert_eq!(factory.created(), 1);
        assert_eq!(engine.job_list(), vec![last]);
        assert_eq!(engine.metrics().dispatched(OperationKind::GetUpdates), 1);
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let engine = PackageEngine::new(|_job_id: JobId, sink: EventSink| {
            let (worker, _handle) = crate::worker::ManualWorker::new(sink);
            Box::new(worker) as Box<dyn crate::worker::PackageWorker>
        });
        let job_id = engine.find_packages("vim").unwrap();
        assert_eq!(engine.job_status(job_id).unwrap().status, "query");
    }
}
