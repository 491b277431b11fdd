pub mod entities;
pub mod events;
pub mod executor;
pub mod snapshot;
pub mod value_objects;

pub use entities::{ControlAction, ItemError, Job, JobKind, JobStatus, ProgressSample};
pub use events::PushEvent;
pub use executor::JobExecutor;
pub use snapshot::{Snapshot, UpsertOutcome};
pub use value_objects::{JobConfig, JobId, JobPayload, ProcessingStrategy};
