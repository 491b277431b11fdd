use super::dto::{DashboardOverview, JobView};
use crate::modules::jobs::controller::LifecycleController;
use crate::modules::jobs::domain::{
    Job, JobConfig, JobExecutor, JobId, JobKind, JobPayload, PushEvent, UpsertOutcome,
};
use crate::modules::jobs::infrastructure::{HttpJobExecutor, RetryPolicy};
use crate::modules::jobs::metrics::MetricsAggregator;
use crate::modules::jobs::registry::{JobFilter, JobRegistry, JobStatistics};
use crate::modules::jobs::tracker::ProgressTracker;
use crate::shared::config::AppConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::{log_debug, log_info};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Entry point for the dashboard: one registry shared by every job surface
pub struct BulkOperationService {
    registry: Arc<JobRegistry>,
    controller: LifecycleController,
    tracker: Arc<ProgressTracker>,
    retention: Duration,
    cleanup_interval: Duration,
    shutdown: CancellationToken,
}

impl BulkOperationService {
    pub fn new(executor: Arc<dyn JobExecutor>, config: &AppConfig) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let call_timeout =
            RetryPolicy::with_max_retries(config.max_retries).operation_timeout(config.request_timeout);
        let controller = LifecycleController::new(
            Arc::clone(&executor),
            Arc::clone(&registry),
            call_timeout,
        );
        let tracker = Arc::new(ProgressTracker::new(
            Arc::clone(&registry),
            executor,
            config.poll_interval,
            call_timeout,
        ));

        Self {
            registry,
            controller,
            tracker,
            retention: config.retention,
            cleanup_interval: config.cleanup_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Service talking to the REST executor described by `config`
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let executor: Arc<dyn JobExecutor> = Arc::new(HttpJobExecutor::from_config(config)?);
        Ok(Self::new(executor, config))
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub async fn start(
        &self,
        kind: JobKind,
        payload: JobPayload,
        config: JobConfig,
    ) -> AppResult<JobId> {
        let job_id = self.controller.start(kind, payload, config).await?;
        self.tracker.track(job_id.clone());
        Ok(job_id)
    }

    pub async fn pause(&self, job_id: &JobId) -> AppResult<()> {
        self.controller.pause(job_id).await
    }

    pub async fn resume(&self, job_id: &JobId) -> AppResult<()> {
        self.controller.resume(job_id).await
    }

    pub async fn cancel(&self, job_id: &JobId) -> AppResult<()> {
        self.controller.cancel(job_id).await
    }

    /// Retry failed items; tracks whichever job now carries the retry
    pub async fn retry(&self, job_id: &JobId) -> AppResult<JobId> {
        let retried = self.controller.retry(job_id).await?;
        self.tracker.track(retried.clone());
        Ok(retried)
    }

    pub fn job(&self, job_id: &JobId) -> AppResult<JobView> {
        self.registry
            .get(job_id)
            .map(JobView::from)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    pub fn jobs(&self, filter: &JobFilter) -> Vec<JobView> {
        self.registry
            .list(filter)
            .into_iter()
            .map(JobView::from)
            .collect()
    }

    pub fn overview(&self, filter: &JobFilter) -> DashboardOverview {
        let jobs = self.registry.list(filter);
        DashboardOverview {
            totals: MetricsAggregator::aggregate(&jobs),
            by_kind: MetricsAggregator::by_kind(&jobs),
            statistics: self.registry.statistics(),
        }
    }

    pub fn statistics(&self) -> JobStatistics {
        self.registry.statistics()
    }

    /// Forget a job locally; the executor is not contacted
    pub fn remove(&self, job_id: &JobId) -> Option<Job> {
        self.tracker.untrack(job_id);
        self.registry.remove(job_id)
    }

    pub fn cleanup_finished(&self, max_age: Duration) -> usize {
        self.registry.cleanup(max_age)
    }

    pub fn handle_push(&self, event: PushEvent) -> AppResult<UpsertOutcome> {
        self.tracker.handle_push(event)
    }

    /// Consume the executor's push channel until it closes
    pub async fn run_push_stream<S>(&self, stream: S)
    where
        S: Stream<Item = String> + Send,
    {
        self.tracker.run_push_stream(stream).await
    }

    /// Periodically evict finished jobs older than the configured retention.
    /// The task ends on `shutdown` or once the service is dropped.
    pub fn start_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(service) = service.upgrade() else {
                    break;
                };
                let removed = service.cleanup_finished(service.retention);
                log_debug!("Cleanup pass removed {} jobs", removed);
            }
            log_debug!("Cleanup task stopped");
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.shutdown();
        log_info!("Bulk operation service shut down");
    }
}

impl Drop for BulkOperationService {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.tracker.shutdown();
    }
}
