use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, OperationKind, PackageId, WorkerState};

/// Snapshot answered by a job status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,

    /// Operation the job was dispatched with
    pub kind: OperationKind,

    /// State as reported by the worker at query time
    pub state: WorkerState,

    /// Short status text derived from `state`
    pub status: String,

    /// Package the worker is currently acting on, if any
    pub package: Option<PackageId>,

    pub created_at: DateTime<Utc>,
}

impl JobStatus {
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> crate::EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
