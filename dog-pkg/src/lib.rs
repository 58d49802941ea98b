//! # dog-pkg: Package Job Registry and Dispatch Engine
//!
//! **In-process job engine that sits in front of a package-management backend**
//!
//! Every request (search, get updates, update the system, resolve
//! dependencies, install, remove) becomes a job with a process-unique id. The
//! job is handed to a worker that talks to the real backend, and every state
//! change the worker reports is republished as a job-scoped event.
//!
//! ## Guarantees
//!
//! - **Unique ids**: job ids increase strictly and are never reused, even
//!   after a job is reaped
//! - **One system update at a time**: a second update request fails with
//!   `OperationConflict` and consumes no id
//! - **Ordered relay**: events from one job reach subscribers in the order
//!   the worker produced them; `job-list-changed` for a new job precedes all
//!   of its own events
//! - **Non-blocking dispatch**: operation calls return the job id right away
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_pkg::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> EngineResult<()> {
//!     let engine = PackageEngine::new(SimulatedWorkerFactory::default());
//!     let mut events = engine.subscribe();
//!
//!     let job_id = engine.find_packages("vim")?;
//!     println!("search running as job {}", job_id);
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{}: {:?}", event.event_name(), event.job_id());
//!         if matches!(event, EngineEvent::Finished { .. }) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod types;
pub mod error;
pub mod job;
pub mod relay;
pub mod worker;
pub mod observability;

pub use engine::{EngineConfig, PackageEngine};
pub use types::{
    EngineEvent, ExitKind, JobId, JobIdAllocator, JobStatus, Operation, OperationKind,
    PackageId, PackageInfo, PackageState, WorkerEvent, WorkerState,
};
pub use error::{EngineError, EngineResult};
pub use job::{ConflictGuard, JobRecord, JobRegistry};
pub use relay::{BoxStream, EventSink, NotificationRelay};
pub use worker::{
    ManualHandle, ManualWorker, ManualWorkerFactory, PackageWorker, SimulatedConfig,
    SimulatedWorker, SimulatedWorkerFactory, WorkerFactory,
};

// Observability exports
pub use observability::{EngineMetrics, MetricsSnapshot};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

/// Commonly used engine types
pub mod prelude {
    pub use crate::{EngineConfig, PackageEngine};

    pub use crate::{
        EngineError, EngineEvent, EngineResult, ExitKind, JobId, JobStatus, Operation,
        OperationKind, PackageId, PackageInfo, WorkerState,
    };

    pub use crate::{EventSink, PackageWorker, WorkerFactory};
    pub use crate::{ManualWorkerFactory, SimulatedConfig, SimulatedWorkerFactory};
}
