pub mod modules;
pub mod shared;

pub use modules::jobs::{
    BulkOperationService, HttpJobExecutor, Job, JobConfig, JobExecutor, JobFilter, JobId, JobKind,
    JobPayload, JobRegistry, JobStatus, JobView, LifecycleController, MetricsAggregator,
    ProgressTracker, PushEvent, Snapshot, UpsertOutcome,
};
pub use shared::config::AppConfig;
pub use shared::errors::{AppError, AppResult};
pub use shared::utils::logger::init_logger;
