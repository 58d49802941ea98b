pub mod registry;
pub mod guard;

pub use registry::{JobRecord, JobRegistry};
pub use guard::ConflictGuard;
