use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExitKind, JobId, JobStatus, PackageId, PackageInfo, WorkerState};

/// Event produced by a worker, before the relay tags it with a job id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    StatusChanged {
        state: WorkerState,
        package: Option<PackageId>,
    },
    ProgressChanged {
        percentage: u8,
    },
    PackagesFound {
        packages: Vec<PackageInfo>,
    },
    Finished {
        exit: ExitKind,
    },
}

impl WorkerEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Engine-level notification published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Registry membership changed; carries the full ordered id set
    JobListChanged {
        job_ids: Vec<JobId>,
        at: DateTime<Utc>,
    },

    /// A job reported a new state
    JobStatusChanged {
        job_id: JobId,
        state: WorkerState,
        status: String,
        package: Option<PackageId>,
        at: DateTime<Utc>,
    },

    /// A job reported progress
    ProgressChanged {
        job_id: JobId,
        percentage: u8,
        at: DateTime<Utc>,
    },

    /// A job produced result items
    PackagesFound {
        job_id: JobId,
        packages: Vec<PackageInfo>,
        at: DateTime<Utc>,
    },

    /// A job finished; its record is reclaimed right after this event
    ///
    /// `final_status` is the job's status taken while it was still
    /// registered, since `job_status` answers `NotFound` once the record is
    /// gone.
    Finished {
        job_id: JobId,
        exit: ExitKind,
        final_status: JobStatus,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Tag a worker event with its job id
    ///
    /// `final_status` is only called for `finished`.
    pub fn from_worker<F>(job_id: JobId, event: WorkerEvent, final_status: F) -> Self
    where
        F: FnOnce() -> JobStatus,
    {
        let at = Utc::now();
        match event {
            WorkerEvent::StatusChanged { state, package } => Self::JobStatusChanged {
                job_id,
                state,
                status: state.status_text().to_string(),
                package,
                at,
            },
            WorkerEvent::ProgressChanged { percentage } => Self::ProgressChanged {
                job_id,
                percentage,
                at,
            },
            WorkerEvent::PackagesFound { packages } => Self::PackagesFound {
                job_id,
                packages,
                at,
            },
            WorkerEvent::Finished { exit } => Self::Finished {
                job_id,
                exit,
                final_status: final_status(),
                at,
            },
        }
    }

    pub fn job_list_changed(job_ids: Vec<JobId>) -> Self {
        Self::JobListChanged {
            job_ids,
            at: Utc::now(),
        }
    }

    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JobListChanged { .. } => "job-list-changed",
            Self::JobStatusChanged { .. } => "job-status-changed",
            Self::ProgressChanged { .. } => "progress-changed",
            Self::PackagesFound { .. } => "packages-found",
            Self::Finished { .. } => "finished",
        }
    }

    /// Job the event belongs to; `None` for registry-wide events
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::JobListChanged { .. } => None,
            Self::JobStatusChanged { job_id, .. }
            | Self::ProgressChanged { job_id, .. }
            | Self::PackagesFound { job_id, .. }
            | Self::Finished { job_id, .. } => Some(*job_id),
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::JobListChanged { at, .. }
            | Self::JobStatusChanged { at, .. }
            | Self::ProgressChanged { at, .. }
            | Self::PackagesFound { at, .. }
            | Self::Finished { at, .. } => at,
        }
    }

    /// Serialize for a transport
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> crate::EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationKind;

    fn no_status() -> JobStatus {
        panic!("status requested for a non-terminal event")
    }

    fn finished_status(job_id: JobId, exit: ExitKind) -> JobStatus {
        let state = WorkerState::Finished(exit);
        JobStatus {
            job_id,
            kind: OperationKind::GetUpdates,
            state,
            status: state.status_text().to_string(),
            package: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_worker_status() {
        let package = PackageId::parse("foo").unwrap();
        let event = EngineEvent::from_worker(
            JobId(3),
            WorkerEvent::StatusChanged {
                state: WorkerState::Running(OperationKind::InstallPackages),
                package: Some(package.clone()),
            },
            no_status,
        );

        assert_eq!(event.event_name(), "job-status-changed");
        assert_eq!(event.job_id(), Some(JobId(3)));
        match event {
            EngineEvent::JobStatusChanged { status, package: p, .. } => {
                assert_eq!(status, "install");
                assert_eq!(p, Some(package));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_finished_carries_final_status() {
        let event = EngineEvent::from_worker(JobId(5), WorkerEvent::Finished { exit: ExitKind::Success }, || {
            finished_status(JobId(5), ExitKind::Success)
        });
        match event {
            EngineEvent::Finished { job_id, final_status, .. } => {
                assert_eq!(job_id, JobId(5));
                assert_eq!(final_status.state, WorkerState::Finished(ExitKind::Success));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_job_list_changed_has_no_job() {
        let event = EngineEvent::job_list_changed(vec![JobId(1), JobId(2)]);
        assert_eq!(event.event_name(), "job-list-changed");
        assert_eq!(event.job_id(), None);
        assert!(*event.timestamp() <= Utc::now());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json() {
        let event = EngineEvent::from_worker(JobId(9), WorkerEvent::Finished { exit: ExitKind::Failed }, || {
            finished_status(JobId(9), ExitKind::Failed)
        });
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "finished");
        assert_eq!(value["job_id"], 9);
        assert_eq!(value["exit"], "failed");
        assert_eq!(value["final_status"]["status"], "exit");
        assert_eq!(value["final_status"]["kind"], "get-updates");
    }
}
