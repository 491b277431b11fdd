/// Lifecycle controller
///
/// Translates dashboard intent (start, pause, resume, cancel, retry) into
/// executor commands. Pause, resume and cancel are applied to the registry
/// optimistically before the executor answers and rolled back if the call
/// fails or times out.
///
/// Cancel racing a natural completion: whichever terminal transition is
/// committed to the registry first wins. An optimistic cancel stores
/// `cancelled` with an end time, so a completion snapshot arriving afterwards
/// is dropped by the terminal lock; a completion stored before the cancel makes
/// the cancel fail with `InvalidTransition`. Server intent is not guessed.
use crate::modules::jobs::domain::{
    ControlAction, Job, JobConfig, JobExecutor, JobId, JobKind, JobPayload,
};
use crate::modules::jobs::registry::{JobRegistry, OptimisticChange};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::{LogContext, TimedOperation};
use crate::shared::utils::validation::Validator;
use crate::{log_debug, log_info};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct LifecycleController {
    executor: Arc<dyn JobExecutor>,
    registry: Arc<JobRegistry>,
    request_timeout: Duration,
}

impl LifecycleController {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        registry: Arc<JobRegistry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            registry,
            request_timeout,
        }
    }

    /// Request a new job and insert it as `queued` before any progress arrives
    pub async fn start(
        &self,
        kind: JobKind,
        payload: JobPayload,
        config: JobConfig,
    ) -> AppResult<JobId> {
        Validator::validate_start(kind, &payload, &config)?;

        let total_items = payload.item_count();
        let timer = TimedOperation::new(format!("start {} job", kind));
        let job_id = self
            .with_timeout(
                "start",
                self.executor.create(kind, payload, config.clone()),
            )
            .await?;

        if job_id.is_blank() {
            return Err(AppError::TransportError(
                "executor returned an empty job id".to_string(),
            ));
        }

        let job = Job::queued(job_id.clone(), kind, config, total_items, Utc::now())
            .with_provisional_start();
        self.registry.insert_if_absent(job);
        timer.finish(job_id.as_str());
        LogContext::job_command("start", job_id.as_str(), Some("queued"));
        Ok(job_id)
    }

    pub async fn pause(&self, job_id: &JobId) -> AppResult<()> {
        self.optimistic(job_id, ControlAction::Pause).await
    }

    pub async fn resume(&self, job_id: &JobId) -> AppResult<()> {
        self.optimistic(job_id, ControlAction::Resume).await
    }

    /// Cooperative: the local `cancelled` state is shown immediately while the
    /// executor winds down
    pub async fn cancel(&self, job_id: &JobId) -> AppResult<()> {
        self.optimistic(job_id, ControlAction::Cancel).await
    }

    /// Retry the retryable failed items of a finished job.
    ///
    /// The returned id is the source of truth: the same id means the job was
    /// reopened in place, a different id is a new job tracking the retry.
    pub async fn retry(&self, job_id: &JobId) -> AppResult<JobId> {
        let job = self.require(job_id)?;
        job.ensure_allows(ControlAction::Retry)?;

        let item_ids = job.retryable_item_ids();
        if item_ids.is_empty() {
            return Err(AppError::StartRejected(format!(
                "job {} has no retryable items",
                job_id
            )));
        }
        let retry_items = item_ids.len() as u64;

        LogContext::job_command("retry", job_id.as_str(), None);
        let retried_id = self
            .with_timeout("retry", self.executor.retry(job_id, item_ids))
            .await?;

        let now = Utc::now();
        if retried_id == *job_id {
            self.registry.reopen(job_id, retry_items, now)?;
            LogContext::job_command("retry", job_id.as_str(), Some("reopened"));
        } else {
            let retry_job = Job::queued(
                retried_id.clone(),
                job.kind,
                job.config.clone(),
                retry_items,
                now,
            )
            .with_provisional_start()
            .with_retry_of(job_id.clone());
            self.registry.insert_if_absent(retry_job);
            log_info!("Job {} retried as new job {}", job_id, retried_id);
        }

        Ok(retried_id)
    }

    async fn optimistic(&self, job_id: &JobId, action: ControlAction) -> AppResult<()> {
        self.require(job_id)?;
        let change = self
            .registry
            .apply_optimistic(job_id, action, Utc::now())?;
        LogContext::job_command(&action.to_string(), job_id.as_str(), None);

        // Executor is only contacted once the local transition is known valid
        let call = match action {
            ControlAction::Pause => self.executor.pause(job_id),
            ControlAction::Resume => self.executor.resume(job_id),
            ControlAction::Cancel => self.executor.cancel(job_id),
            ControlAction::Retry => {
                return Err(AppError::InvalidTransition(
                    "retry is not an optimistic action".to_string(),
                ))
            }
        };

        match self.with_timeout(&action.to_string(), call).await {
            Ok(()) => {
                LogContext::job_command(
                    &action.to_string(),
                    job_id.as_str(),
                    Some(&change.applied_status.to_string()),
                );
                Ok(())
            }
            Err(e) => {
                self.roll_back(&change, &e);
                Err(e)
            }
        }
    }

    fn roll_back(&self, change: &OptimisticChange, cause: &AppError) {
        if self.registry.rollback(change) {
            LogContext::rollback(&change.action.to_string(), change.job_id.as_str(), cause);
        } else {
            log_debug!(
                "Nothing to roll back for {} on {}",
                change.action,
                change.job_id
            );
        }
    }

    fn require(&self, job_id: &JobId) -> AppResult<Job> {
        self.registry
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Bound every executor call; a timeout is a transport failure
    async fn with_timeout<T, F>(&self, action: &str, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TransportError(format!(
                "{} timed out after {:?}",
                action, self.request_timeout
            ))),
        }
    }
}
