//! Notification relay.
//!
//! Workers report through an [`EventSink`]; all sinks of one engine feed a
//! single ordered channel drained by the relay task, which re-publishes each
//! event as an [`EngineEvent`] tagged with the job id. A `finished` event is
//! published first, carrying the job's last status, and the job record is
//! reclaimed right after it.

pub mod sink;

use std::pin::Pin;
use std::sync::Weak;

use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

pub use sink::{EventSink, RelayMessage};

use crate::engine::EngineCore;
use crate::job::JobRegistry;
use crate::observability::EngineMetrics;
use crate::types::{EngineEvent, JobId, WorkerEvent};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Fan-out publisher for engine events
#[derive(Clone)]
pub struct NotificationRelay {
    sender: broadcast::Sender<EngineEvent>,
}

impl NotificationRelay {
    /// Create a relay with the given broadcast buffer capacity
    ///
    /// Slow subscribers that fall further behind than `capacity` events
    /// observe a lag and miss the oldest events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers, returning how many received it
    pub fn publish(&self, event: EngineEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    pub fn job_list_changed(&self, job_ids: Vec<JobId>) -> usize {
        debug!(?job_ids, "emitting job-list-changed");
        self.publish(EngineEvent::job_list_changed(job_ids))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a stream; lagged gaps are skipped
    pub fn event_stream(&self) -> BoxStream<EngineEvent> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(err) => {
                warn!("event subscriber lagged: {}", err);
                None
            }
        });
        Box::pin(stream)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationRelay {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Drain worker events until the channel closes or the engine is dropped
pub(crate) async fn pump(mut rx: mpsc::UnboundedReceiver<RelayMessage>, core: Weak<EngineCore>) {
    while let Some((job_id, event)) = rx.recv().await {
        let Some(engine) = core.upgrade() else {
            break;
        };
        forward(&engine.registry, &engine.relay, &engine.metrics, job_id, event);
    }
    debug!("relay task stopped");
}

/// Re-publish one worker event; reclaims the job on `finished`
pub(crate) fn forward(
    registry: &Mutex<JobRegistry>,
    relay: &NotificationRelay,
    metrics: &EngineMetrics,
    job_id: JobId,
    event: WorkerEvent,
) {
    let finished = match &event {
        WorkerEvent::Finished { exit } => Some(*exit),
        _ => None,
    };

    let engine_event = {
        let registry = registry.lock();
        let Some(record) = registry.lookup(job_id) else {
            warn!(job_id = %job_id, ?event, "dropping event for unregistered job");
            return;
        };
        EngineEvent::from_worker(job_id, event, || record.status())
    };

    relay.publish(engine_event);
    metrics.record_event_relayed();

    if let Some(exit) = finished {
        metrics.record_finished(exit);
        // Worker is dropped after the lock is released
        let removed = registry.lock().remove(job_id);
        match removed {
            Ok(_worker) => debug!(job_id = %job_id, %exit, "job reclaimed"),
            Err(err) => warn!(job_id = %job_id, "finished job already gone: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitKind, OperationKind, WorkerState};
    use crate::worker::PackageWorker;
    use crate::types::{Operation, PackageId};

    struct StaticWorker(WorkerState);

    impl PackageWorker for StaticWorker {
        fn start(&self, _operation: Operation) {}

        fn state(&self) -> WorkerState {
            self.0
        }

        fn subject_package(&self) -> Option<PackageId> {
            None
        }

        fn cancel(&self) -> bool {
            false
        }
    }

    fn registry_with(relay: &NotificationRelay, ids: &[u64]) -> Mutex<JobRegistry> {
        let mut registry = JobRegistry::new(relay.clone());
        for id in ids {
            registry
                .register(
                    JobId(*id),
                    OperationKind::GetUpdates,
                    Box::new(StaticWorker(WorkerState::Running(OperationKind::GetUpdates))),
                )
                .unwrap();
        }
        Mutex::new(registry)
    }

    #[test]
    fn test_finished_is_published_before_removal() {
        let relay = NotificationRelay::new(16);
        let registry = registry_with(&relay, &[1, 2]);
        let metrics = EngineMetrics::new();
        let mut rx = relay.subscribe();

        forward(&registry, &relay, &metrics, JobId(1), WorkerEvent::Finished { exit: ExitKind::Success });

        match rx.try_recv().unwrap() {
            EngineEvent::Finished { job_id, exit, final_status, .. } => {
                assert_eq!(job_id, JobId(1));
                assert_eq!(exit, ExitKind::Success);
                assert_eq!(final_status.job_id, JobId(1));
                assert_eq!(final_status.kind, OperationKind::GetUpdates);
                assert_eq!(final_status.status, "query");
            }
            other => panic!("expected finished, got {:?}", other),
        }
        match rx.try_recv().unwrap() {
            EngineEvent::JobListChanged { job_ids, .. } => assert_eq!(job_ids, vec![JobId(2)]),
            other => panic!("expected job-list-changed, got {:?}", other),
        }
        assert_eq!(registry.lock().list(), vec![JobId(2)]);
        assert_eq!(metrics.jobs_succeeded(), 1);
        assert_eq!(metrics.events_relayed(), 1);
    }

    #[test]
    fn test_events_for_unknown_jobs_are_dropped() {
        let relay = NotificationRelay::new(16);
        let registry = registry_with(&relay, &[]);
        let metrics = EngineMetrics::new();
        let mut rx = relay.subscribe();

        forward(&registry, &relay, &metrics, JobId(8), WorkerEvent::ProgressChanged { percentage: 5 });
        forward(&registry, &relay, &metrics, JobId(8), WorkerEvent::Finished { exit: ExitKind::Failed });

        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.events_relayed(), 0);
        assert_eq!(metrics.jobs_failed(), 0);
    }

    #[tokio::test]
    async fn test_event_stream_delivers_in_order() {
        let relay = NotificationRelay::new(16);
        let mut stream = relay.event_stream();
        assert_eq!(relay.receiver_count(), 1);

        relay.job_list_changed(vec![JobId(1)]);
        relay.job_list_changed(vec![]);

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert!(matches!(first, EngineEvent::JobListChanged { ref job_ids, .. } if job_ids == &vec![JobId(1)]));
        assert!(matches!(second, EngineEvent::JobListChanged { ref job_ids, .. } if job_ids.is_empty()));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let relay = NotificationRelay::default();
        assert_eq!(relay.job_list_changed(vec![JobId(1)]), 0);
    }
}
