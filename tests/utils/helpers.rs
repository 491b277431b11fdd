/// Test helper functions and service builders
use async_trait::async_trait;
use shopsync_lib::modules::jobs::{
    BulkOperationService, JobConfig, JobExecutor, JobId, JobKind, JobPayload, Snapshot,
};
use shopsync_lib::shared::config::AppConfig;
use shopsync_lib::shared::errors::{AppError, AppResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory executor with scripted answers and recorded calls
#[derive(Default)]
pub struct ScriptedExecutor {
    next_id: AtomicU32,
    retry_as_new_job: AtomicBool,
    calls: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<JobId, VecDeque<Snapshot>>>,
    start_error: Mutex<Option<AppError>>,
    control_error: Mutex<Option<AppError>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn reject_starts_with(&self, error: AppError) {
        *self.start_error.lock().unwrap() = Some(error);
    }

    pub fn fail_controls_with(&self, error: AppError) {
        *self.control_error.lock().unwrap() = Some(error);
    }

    pub fn retry_as_new_job(&self) {
        self.retry_as_new_job.store(true, Ordering::SeqCst);
    }

    /// Poll answers for a job, served in order; the last one repeats
    pub fn script_status(&self, job_id: &JobId, snapshots: Vec<Snapshot>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id.clone(), snapshots.into_iter().collect());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pause_if_configured(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn control(&self, action: &str, job_id: &JobId) -> AppResult<()> {
        self.record(format!("{} {}", action, job_id));
        self.pause_if_configured().await;
        match self.control_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    async fn create(
        &self,
        kind: JobKind,
        payload: JobPayload,
        _config: JobConfig,
    ) -> AppResult<JobId> {
        self.record(format!("create {} {}", kind, payload.item_count()));
        self.pause_if_configured().await;
        if let Some(error) = self.start_error.lock().unwrap().clone() {
            return Err(error);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobId::new(format!("{}-{}", kind, n)))
    }

    async fn status(&self, job_id: &JobId) -> AppResult<Snapshot> {
        self.record(format!("status {}", job_id));
        self.pause_if_configured().await;
        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses
            .get_mut(job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        let snapshot = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        snapshot.ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }

    async fn pause(&self, job_id: &JobId) -> AppResult<()> {
        self.control("pause", job_id).await
    }

    async fn resume(&self, job_id: &JobId) -> AppResult<()> {
        self.control("resume", job_id).await
    }

    async fn cancel(&self, job_id: &JobId) -> AppResult<()> {
        self.control("cancel", job_id).await
    }

    async fn retry(&self, job_id: &JobId, item_ids: Vec<String>) -> AppResult<JobId> {
        self.record(format!("retry {} {}", job_id, item_ids.join(",")));
        self.pause_if_configured().await;
        if let Some(error) = self.control_error.lock().unwrap().clone() {
            return Err(error);
        }
        if self.retry_as_new_job.load(Ordering::SeqCst) {
            Ok(JobId::new(format!("{}-retry", job_id)))
        } else {
            Ok(job_id.clone())
        }
    }
}

/// Fast intervals so poll loops settle within a test
pub fn test_config() -> AppConfig {
    AppConfig {
        poll_interval: Duration::from_millis(10),
        request_timeout: Duration::from_millis(250),
        cleanup_interval: Duration::from_millis(20),
        max_retries: 0,
        ..AppConfig::default()
    }
}

pub fn build_service(executor: Arc<ScriptedExecutor>) -> BulkOperationService {
    BulkOperationService::new(executor, &test_config())
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
