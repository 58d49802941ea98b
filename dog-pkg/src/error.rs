use thiserror::Error;

use crate::types::JobId;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported synchronously by engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Another system update is still running
    #[error("Operation conflict: {0}")]
    OperationConflict(String),

    /// The job id was never issued or the job has already been reaped
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Request parameters failed validation before any job was created
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Conflict raised when a system update is requested while one is running
    pub fn update_in_progress() -> Self {
        Self::OperationConflict("a system update is already in progress".to_string())
    }

    /// Create an invalid parameters error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    /// Stable error name for transports
    pub fn name(&self) -> &'static str {
        match self {
            Self::OperationConflict(_) => "OperationConflict",
            Self::NotFound(_) => "NotFound",
            Self::InvalidParameters(_) => "InvalidParameters",
            Self::Internal(_) => "Internal",
        }
    }

    /// Check if the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OperationConflict(_))
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {}", err))
    }
}
