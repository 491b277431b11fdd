/// Port to the external job executor
///
/// Defines the commands the dashboard can send. The executor owns the actual
/// work; this side only observes and steers it.
use crate::modules::jobs::domain::entities::JobKind;
use crate::modules::jobs::domain::snapshot::Snapshot;
use crate::modules::jobs::domain::value_objects::{JobConfig, JobId, JobPayload};
use crate::shared::errors::AppResult;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Ask the executor to create a job; returns the id it assigned
    async fn create(
        &self,
        kind: JobKind,
        payload: JobPayload,
        config: JobConfig,
    ) -> AppResult<JobId>;

    /// Full status snapshot (poll fallback)
    async fn status(&self, job_id: &JobId) -> AppResult<Snapshot>;

    async fn pause(&self, job_id: &JobId) -> AppResult<()>;

    async fn resume(&self, job_id: &JobId) -> AppResult<()>;

    async fn cancel(&self, job_id: &JobId) -> AppResult<()>;

    /// Retry the given failed items. The returned id is either the same job
    /// (retried in place) or a new job created for the retry.
    async fn retry(&self, job_id: &JobId, item_ids: Vec<String>) -> AppResult<JobId>;
}
