pub mod scheduler;
pub mod sync;

pub use scheduler::{CycleOutcome, Scheduler, Syncer};
pub use sync::SyncService;
