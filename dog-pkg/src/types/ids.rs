use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{EngineError, EngineResult};

/// Process-unique job identifier
///
/// Issued by [`JobIdAllocator`] and never reused while the process lives,
/// even after the job finishes and leaves the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Monotonic job handle allocator
///
/// Ids never wrap: once `u64::MAX` is reached the allocator is exhausted and
/// every further call fails.
#[derive(Debug)]
pub struct JobIdAllocator {
    next: AtomicU64,
}

impl JobIdAllocator {
    /// Create an allocator whose first id is `base` (zero is bumped to one)
    pub fn new(base: u64) -> Self {
        Self {
            next: AtomicU64::new(base.max(1)),
        }
    }

    /// Issue the next job id
    pub fn next(&self) -> EngineResult<JobId> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .map(JobId)
            .map_err(|_| EngineError::Internal("job id space exhausted".to_string()))
    }

    /// The id the next call to [`next`](Self::next) will return
    pub fn peek(&self) -> JobId {
        JobId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for JobIdAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
