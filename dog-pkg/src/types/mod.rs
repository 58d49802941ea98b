pub mod ids;
pub mod package;
pub mod operation;
pub mod state;
pub mod events;
pub mod status;

pub use ids::{JobId, JobIdAllocator};
pub use package::{PackageId, PackageInfo, PackageState};
pub use operation::{Operation, OperationKind};
pub use state::{ExitKind, WorkerState};
pub use events::{EngineEvent, WorkerEvent};
pub use status::JobStatus;
