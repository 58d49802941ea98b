use std::fmt;

use chrono::{DateTime, Utc};

use crate::relay::NotificationRelay;
use crate::types::{JobId, JobStatus, OperationKind, WorkerState};
use crate::worker::PackageWorker;
use crate::{EngineError, EngineResult};

/// A live job: its id, the dispatched operation kind, and the owned worker
pub struct JobRecord {
    job_id: JobId,
    kind: OperationKind,
    worker: Box<dyn PackageWorker>,
    created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn worker(&self) -> &dyn PackageWorker {
        &*self.worker
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the job as the worker reports it right now
    pub fn status(&self) -> JobStatus {
        let state = self.worker.state();
        JobStatus {
            job_id: self.job_id,
            kind: self.kind,
            state,
            status: state.status_text().to_string(),
            package: self.worker.subject_package(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("job_id", &self.job_id)
            .field("kind", &self.kind)
            .field("state", &self.worker.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// In-flight job table
///
/// Records are kept in insertion order. Ids are registered in increasing
/// order, so lookups can binary search the same vector that enumeration
/// walks. Every membership change publishes `job-list-changed` with the full
/// ordered id set.
///
/// The registry does no locking of its own; the engine wraps it in a single
/// mutex.
pub struct JobRegistry {
    records: Vec<JobRecord>,
    relay: NotificationRelay,
}

impl JobRegistry {
    pub fn new(relay: NotificationRelay) -> Self {
        Self {
            records: Vec::new(),
            relay,
        }
    }

    /// Insert a new record and announce the new job list
    pub fn register(
        &mut self,
        job_id: JobId,
        kind: OperationKind,
        worker: Box<dyn PackageWorker>,
    ) -> EngineResult<&JobRecord> {
        if let Some(last) = self.records.last() {
            if last.job_id >= job_id {
                return Err(EngineError::Internal(format!(
                    "job {} registered after job {}",
                    job_id, last.job_id
                )));
            }
        }

        let index = self.records.len();
        self.records.push(JobRecord {
            job_id,
            kind,
            worker,
            created_at: Utc::now(),
        });
        self.relay.job_list_changed(self.list());
        Ok(&self.records[index])
    }

    pub fn lookup(&self, job_id: JobId) -> Option<&JobRecord> {
        self.position(job_id).map(|index| &self.records[index])
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.position(job_id).is_some()
    }

    /// Remove a record, handing its worker back to the caller
    pub fn remove(&mut self, job_id: JobId) -> EngineResult<Box<dyn PackageWorker>> {
        let index = self.position(job_id).ok_or(EngineError::NotFound(job_id))?;
        let record = self.records.remove(index);
        self.relay.job_list_changed(self.list());
        Ok(record.worker)
    }

    /// Registered ids in creation order
    pub fn list(&self) -> Vec<JobId> {
        self.records.iter().map(|record| record.job_id).collect()
    }

    /// Whether any registered worker currently satisfies `predicate`
    pub fn exists_with_state<F>(&self, predicate: F) -> bool
    where
        F: Fn(&WorkerState) -> bool,
    {
        self.records
            .iter()
            .any(|record| predicate(&record.worker.state()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, job_id: JobId) -> Option<usize> {
        self.records
            .binary_search_by_key(&job_id, |record| record.job_id)
            .ok()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records.iter()).finish()
    }
}
