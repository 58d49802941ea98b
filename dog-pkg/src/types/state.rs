use serde::{Deserialize, Serialize};
use std::fmt;

use super::OperationKind;

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    Success,
    Failed,
    Cancelled,
}

impl ExitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State a worker reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed but not started
    Idle,
    /// Performing the given operation
    Running(OperationKind),
    /// Done; the finished event is on its way to the relay
    Finished(ExitKind),
}

impl WorkerState {
    /// Short status text: `idle`, `query`, `install`, `remove`, `update` or `exit`
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running(kind) => kind.status_text(),
            Self::Finished(_) => "exit",
        }
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        matches!(self, Self::Running(running) if *running == kind)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}
