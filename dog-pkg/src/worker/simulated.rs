use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::{PackageWorker, WorkerFactory};
use crate::relay::EventSink;
use crate::types::{
    ExitKind, JobId, Operation, OperationKind, PackageId, PackageInfo, PackageState, WorkerState,
};

/// Timing and failure knobs for [`SimulatedWorker`]
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Pause between progress steps
    pub step_delay: Duration,
    /// Number of progress reports before finishing
    pub steps: u8,
    /// Package names whose jobs finish with [`ExitKind::Failed`]
    pub failing_packages: HashSet<String>,
}

impl SimulatedConfig {
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    pub fn with_steps(mut self, steps: u8) -> Self {
        self.steps = steps.max(1);
        self
    }

    pub fn with_failing_package(mut self, name: impl Into<String>) -> Self {
        self.failing_packages.insert(name.into());
        self
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(250),
            steps: 4,
            failing_packages: HashSet::new(),
        }
    }
}

struct SimState {
    state: WorkerState,
    package: Option<PackageId>,
    started: bool,
}

struct SimShared {
    state: Mutex<SimState>,
    cancel: Notify,
    sink: EventSink,
}

impl SimShared {
    fn set_running(&self, kind: OperationKind, package: Option<PackageId>) {
        let state = WorkerState::Running(kind);
        {
            let mut guard = self.state.lock();
            guard.state = state;
            guard.package = package.clone();
        }
        self.sink.status_changed(state, package);
    }

    fn finish(&self, exit: ExitKind) {
        {
            let mut guard = self.state.lock();
            if guard.state.is_finished() {
                return;
            }
            guard.state = WorkerState::Finished(exit);
            guard.package = None;
        }
        self.sink.status_changed(WorkerState::Finished(exit), None);
        self.sink.finished(exit);
    }
}

/// Development worker that pretends to run backend operations
///
/// Runs on a Tokio task, stepping through progress with a fixed delay. Query
/// operations report synthetic package results. Cancellation is honored at
/// the next step boundary.
pub struct SimulatedWorker {
    shared: Arc<SimShared>,
    config: SimulatedConfig,
}

impl SimulatedWorker {
    pub fn new(sink: EventSink, config: SimulatedConfig) -> Self {
        Self {
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState {
                    state: WorkerState::Idle,
                    package: None,
                    started: false,
                }),
                cancel: Notify::new(),
                sink,
            }),
            config,
        }
    }
}

impl PackageWorker for SimulatedWorker {
    fn start(&self, operation: Operation) {
        let job_id = self.shared.sink.job_id();
        {
            let mut guard = self.shared.state.lock();
            if guard.started {
                warn!(job_id = %job_id, "worker started twice, ignoring");
                return;
            }
            guard.started = true;
        }

        self.shared
            .set_running(operation.kind(), operation.packages().first().cloned());

        match Handle::try_current() {
            Ok(handle) => {
                let shared = self.shared.clone();
                let config = self.config.clone();
                handle.spawn(run(shared, operation, config));
            }
            Err(err) => {
                warn!(job_id = %job_id, "no runtime to run simulated job: {}", err);
                self.shared.finish(ExitKind::Failed);
            }
        }
    }

    fn state(&self) -> WorkerState {
        self.shared.state.lock().state
    }

    fn subject_package(&self) -> Option<PackageId> {
        self.shared.state.lock().package.clone()
    }

    fn cancel(&self) -> bool {
        if self.shared.state.lock().state.is_finished() {
            return false;
        }
        // Stored permit wakes the task even if it is not waiting yet
        self.shared.cancel.notify_one();
        true
    }
}

async fn run(shared: Arc<SimShared>, operation: Operation, config: SimulatedConfig) {
    let job_id = shared.sink.job_id();
    let kind = operation.kind();
    let packages = operation.packages();
    info!(job_id = %job_id, %kind, "simulated job running");

    for step in 1..=config.steps {
        if !packages.is_empty() {
            let subject = &packages[(step as usize - 1) % packages.len()];
            let changed = shared.state.lock().package.as_ref() != Some(subject);
            if changed {
                shared.set_running(kind, Some(subject.clone()));
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.step_delay) => {}
            _ = shared.cancel.notified() => {
                debug!(job_id = %job_id, "simulated job cancelled");
                shared.finish(ExitKind::Cancelled);
                return;
            }
        }

        let percentage = (step as u32 * 100 / config.steps as u32) as u8;
        shared.sink.progress_changed(percentage);
    }

    let results = synthesize_results(&operation);
    if !results.is_empty() {
        shared.sink.packages_found(results);
    }

    let failed = packages
        .iter()
        .any(|package| config.failing_packages.contains(package.name()));
    shared.finish(if failed { ExitKind::Failed } else { ExitKind::Success });
}

fn synthesize_results(operation: &Operation) -> Vec<PackageInfo> {
    let make = |raw: String, state: PackageState, summary: String| {
        PackageId::parse(raw)
            .ok()
            .map(|id| PackageInfo::new(id, state, summary))
    };

    match operation {
        Operation::FindPackages { search } => {
            let stem: String = search
                .trim()
                .chars()
                .map(|c| if c.is_whitespace() || c == ';' { '-' } else { c })
                .collect();
            (1..=3)
                .filter_map(|n| {
                    make(
                        format!("{};1.0.{};noarch;simulated", stem, n),
                        PackageState::Available,
                        format!("Simulated match {} for '{}'", n, search.trim()),
                    )
                })
                .collect()
        }
        Operation::GetUpdates => ["kernel", "glibc"]
            .iter()
            .filter_map(|name| {
                make(
                    format!("{};2.0;noarch;updates", name),
                    PackageState::Update,
                    format!("Simulated update for {}", name),
                )
            })
            .collect(),
        Operation::GetDependencies { package } => ["libs", "common"]
            .iter()
            .filter_map(|suffix| {
                make(
                    format!("{}-{};1.0;noarch;simulated", package.name(), suffix),
                    PackageState::Installed,
                    format!("Dependency of {}", package.name()),
                )
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Factory producing [`SimulatedWorker`]s with a shared configuration
#[derive(Default)]
pub struct SimulatedWorkerFactory {
    config: SimulatedConfig,
}

impl SimulatedWorkerFactory {
    pub fn new(config: SimulatedConfig) -> Self {
        Self { config }
    }
}

impl WorkerFactory for SimulatedWorkerFactory {
    fn create(&self, _job_id: JobId, sink: EventSink) -> Box<dyn PackageWorker> {
        Box::new(SimulatedWorker::new(sink, self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayMessage;
    use crate::types::WorkerEvent;
    use tokio::sync::mpsc;

    async fn drain_until_finished(rx: &mut mpsc::UnboundedReceiver<RelayMessage>) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        while let Some((_, event)) = rx.recv().await {
            let done = event.is_finished();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn fast() -> SimulatedConfig {
        SimulatedConfig::default()
            .with_step_delay(Duration::from_millis(1))
            .with_steps(2)
    }

    #[tokio::test]
    async fn test_find_packages_reports_results() {
        let (sink, mut rx) = EventSink::channel(JobId(1));
        let worker = SimulatedWorker::new(sink, fast());
        worker.start(Operation::FindPackages { search: "foo bar".into() });
        assert_eq!(worker.state(), WorkerState::Running(OperationKind::FindPackages));

        let events = drain_until_finished(&mut rx).await;
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::ProgressChanged { percentage } => Some(*percentage),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![50, 100]);

        let found = events
            .iter()
            .find_map(|e| match e {
                WorkerEvent::PackagesFound { packages } => Some(packages.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].package_id.name(), "foo-bar");

        assert_eq!(events.last(), Some(&WorkerEvent::Finished { exit: ExitKind::Success }));
        assert_eq!(worker.state(), WorkerState::Finished(ExitKind::Success));
    }

    #[tokio::test]
    async fn test_failing_package() {
        let (sink, mut rx) = EventSink::channel(JobId(2));
        let worker = SimulatedWorker::new(sink, fast().with_failing_package("broken"));
        worker.start(Operation::InstallPackages {
            packages: vec![PackageId::parse("ok").unwrap(), PackageId::parse("broken;1;x86_64;repo").unwrap()],
        });

        let events = drain_until_finished(&mut rx).await;
        assert_eq!(events.last(), Some(&WorkerEvent::Finished { exit: ExitKind::Failed }));
        assert!(!events.iter().any(|e| matches!(e, WorkerEvent::PackagesFound { .. })));
    }

    #[tokio::test]
    async fn test_cancel_finishes_cancelled() {
        let (sink, mut rx) = EventSink::channel(JobId(3));
        let worker = SimulatedWorker::new(
            sink,
            SimulatedConfig::default().with_step_delay(Duration::from_secs(3600)),
        );
        worker.start(Operation::UpdateSystem);
        assert!(worker.cancel());

        let events = drain_until_finished(&mut rx).await;
        assert_eq!(events.last(), Some(&WorkerEvent::Finished { exit: ExitKind::Cancelled }));
        assert!(!worker.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_pacing_on_paused_clock() {
        let (sink, mut rx) = EventSink::channel(JobId(5));
        let worker = SimulatedWorker::new(sink, SimulatedConfig::default());
        let started = tokio::time::Instant::now();
        worker.start(Operation::GetUpdates);

        let events = drain_until_finished(&mut rx).await;
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::ProgressChanged { percentage } => Some(*percentage),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![25, 50, 75, 100]);
        assert_eq!(events.last(), Some(&WorkerEvent::Finished { exit: ExitKind::Success }));
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn test_start_without_runtime_fails_job() {
        let (sink, mut rx) = EventSink::channel(JobId(4));
        let worker = SimulatedWorker::new(sink, fast());
        worker.start(Operation::GetUpdates);
        assert_eq!(worker.state(), WorkerState::Finished(ExitKind::Failed));

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().map(|(_, e)| e);
        assert_eq!(last, Some(WorkerEvent::Finished { exit: ExitKind::Failed }));
    }
}
