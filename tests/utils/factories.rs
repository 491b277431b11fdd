/// Test data factories using builder pattern
///
/// Snapshots and payloads with sensible defaults for dashboard jobs
use chrono::{DateTime, Duration, Utc};
use shopsync_lib::modules::jobs::{
    ItemError, JobConfig, JobId, JobKind, JobPayload, JobStatus, Snapshot,
};

pub struct SnapshotFactory {
    snapshot: Snapshot,
}

impl SnapshotFactory {
    /// First snapshot of a running job
    pub fn started(job_id: &str, kind: JobKind, total: u64) -> Self {
        Self {
            snapshot: Snapshot::for_job(job_id)
                .with_kind(kind)
                .with_status(JobStatus::Running)
                .with_total(total)
                .with_start_time(Utc::now()),
        }
    }

    /// Partial update carrying only counters
    pub fn progress(job_id: &str) -> Self {
        Self {
            snapshot: Snapshot::for_job(job_id),
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.snapshot = self.snapshot.with_status(status);
        self
    }

    pub fn counts(mut self, successful: u64, failed: u64, skipped: u64) -> Self {
        self.snapshot = self.snapshot.with_counts(successful, failed, skipped);
        self
    }

    /// Only the failure counter, leaving the others to the stored job
    pub fn failed(mut self, failed: u64) -> Self {
        self.snapshot.failed_items = Some(failed);
        self
    }

    pub fn processed(mut self, processed: u64) -> Self {
        self.snapshot = self.snapshot.with_processed(processed);
        self
    }

    pub fn started_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.snapshot = self.snapshot.with_start_time(start_time);
        self
    }

    pub fn started_ago(self, seconds: i64) -> Self {
        self.started_at(Utc::now() - Duration::seconds(seconds))
    }

    pub fn ended_now(mut self) -> Self {
        self.snapshot = self.snapshot.with_end_time(Utc::now());
        self
    }

    pub fn errors(mut self, errors: Vec<ItemError>) -> Self {
        self.snapshot = self.snapshot.with_errors(errors);
        self
    }

    pub fn config(mut self, config: JobConfig) -> Self {
        self.snapshot = self.snapshot.with_config(config);
        self
    }

    pub fn build(self) -> Snapshot {
        self.snapshot
    }
}

/// Product ids `prod-1..=prod-n`
pub fn product_payload(count: usize) -> JobPayload {
    JobPayload::new((1..=count).map(|i| format!("prod-{}", i)))
}

pub fn retryable_error(item_id: &str) -> ItemError {
    ItemError::new(item_id, "RATE_LIMITED", "Shopify API throttled the request", true)
}

pub fn permanent_error(item_id: &str) -> ItemError {
    ItemError::new(item_id, "INVALID_HANDLE", "Handle already in use", false)
}

pub fn job_id(id: &str) -> JobId {
    JobId::from(id)
}
