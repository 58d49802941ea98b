use super::JobRegistry;
use crate::types::OperationKind;
use crate::{EngineError, EngineResult};

/// Policy deciding whether a new job may start next to the registered ones
///
/// Only exclusive kinds (system updates) are restricted: a request is
/// refused while any registered worker reports it is running the same kind.
/// Every other kind runs concurrently with anything.
///
/// Callers must hold the registry lock from the check through registration.
pub struct ConflictGuard;

impl ConflictGuard {
    pub fn allowed(registry: &JobRegistry, kind: OperationKind) -> bool {
        if !kind.is_exclusive() {
            return true;
        }
        // Linear scan; the registry holds a handful of jobs
        !registry.exists_with_state(|state| state.is_running(kind))
    }

    pub fn check(registry: &JobRegistry, kind: OperationKind) -> EngineResult<()> {
        if Self::allowed(registry, kind) {
            Ok(())
        } else {
            Err(EngineError::update_in_progress())
        }
    }
}
