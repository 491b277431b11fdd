/// Progress snapshots and the merge rule that applies them to jobs
///
/// Push events and poll responses both arrive as (possibly partial) snapshots.
/// Present fields overwrite the job, absent ones are left alone. Terminal jobs
/// are locked unless the snapshot resets them with a newer start time, and a
/// snapshot that would move `processedItems` backwards is stale. A start time
/// stamped locally by `start` is provisional: the executor's first reported
/// start time replaces it without counting as a new run.
use super::entities::{ItemError, Job, JobKind, JobStatus, ProgressWindow};
use super::value_objects::{JobConfig, JobId};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, alias = "id")]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub processed_items: Option<u64>,
    #[serde(default)]
    pub successful_items: Option<u64>,
    #[serde(default)]
    pub failed_items: Option<u64>,
    #[serde(default)]
    pub skipped_items: Option<u64>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Option<Vec<ItemError>>,
    #[serde(default)]
    pub config: Option<JobConfig>,
    #[serde(default)]
    pub active_workers: Option<u32>,
    #[serde(default)]
    pub current_item: Option<String>,
}

/// What happened when a snapshot was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Same content as already stored (duplicate delivery)
    Unchanged,
    /// A newer start time replaced the previous run
    Reset,
    /// Late chatter for a job that already reached a terminal state
    IgnoredTerminal,
    /// Out-of-order update with fewer processed items than stored
    Stale,
}

impl UpsertOutcome {
    /// Whether the stored job changed
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            UpsertOutcome::Created | UpsertOutcome::Updated | UpsertOutcome::Reset
        )
    }
}

impl Snapshot {
    pub fn for_job(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_total(mut self, total_items: u64) -> Self {
        self.total_items = Some(total_items);
        self
    }

    /// Set all outcome counters at once; `processedItems` is their sum
    pub fn with_counts(mut self, successful: u64, failed: u64, skipped: u64) -> Self {
        self.successful_items = Some(successful);
        self.failed_items = Some(failed);
        self.skipped_items = Some(skipped);
        self.processed_items = Some(successful.saturating_add(failed).saturating_add(skipped));
        self
    }

    pub fn with_processed(mut self, processed_items: u64) -> Self {
        self.processed_items = Some(processed_items);
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_errors(mut self, errors: Vec<ItemError>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_active_workers(mut self, active_workers: u32) -> Self {
        self.active_workers = Some(active_workers);
        self
    }

    /// The job id, or `MalformedSnapshot` when it is missing or blank
    pub fn require_job_id(&self) -> AppResult<&JobId> {
        match &self.job_id {
            Some(id) if !id.is_blank() => Ok(id),
            Some(_) => Err(AppError::MalformedSnapshot(
                "snapshot carries a blank job id".to_string(),
            )),
            None => Err(AppError::MalformedSnapshot(
                "snapshot carries no job id".to_string(),
            )),
        }
    }

    /// Whether the snapshot says anything about progress
    pub fn carries_progress(&self) -> bool {
        self.processed_items.is_some()
            || self.successful_items.is_some()
            || self.failed_items.is_some()
            || self.skipped_items.is_some()
    }
}

impl Job {
    /// Build a job the registry has never seen from its first snapshot
    pub fn from_snapshot(snapshot: &Snapshot, now: DateTime<Utc>) -> AppResult<Job> {
        let id = snapshot.require_job_id()?.clone();
        let kind = snapshot.kind.ok_or_else(|| {
            AppError::MalformedSnapshot(format!("first snapshot for job {} has no kind", id))
        })?;

        let mut job = Job::queued(
            id,
            kind,
            snapshot.config.clone().unwrap_or_default(),
            0,
            snapshot.start_time.unwrap_or(now),
        );
        job.provisional_start = snapshot.start_time.is_none();
        job.merge_fields(snapshot, now);
        Ok(job)
    }

    /// Processed count after applying `snapshot`. An explicit `processedItems`
    /// wins; otherwise counters the snapshot leaves out keep their stored values.
    pub fn implied_processed(&self, snapshot: &Snapshot) -> Option<u64> {
        if let Some(processed) = snapshot.processed_items {
            return Some(processed);
        }
        if !snapshot.carries_progress() {
            return None;
        }
        let successful = snapshot.successful_items.unwrap_or(self.successful_items);
        let failed = snapshot.failed_items.unwrap_or(self.failed_items);
        let skipped = snapshot.skipped_items.unwrap_or(self.skipped_items);
        Some(successful.saturating_add(failed).saturating_add(skipped))
    }

    /// Merge a snapshot into this job following the registry's ordering rules
    pub fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> AppResult<UpsertOutcome> {
        let id = snapshot.require_job_id()?;
        if *id != self.id {
            return Err(AppError::MalformedSnapshot(format!(
                "snapshot for job {} applied to job {}",
                id, self.id
            )));
        }

        let mut adopted_start = false;
        if let Some(start) = snapshot.start_time {
            if self.provisional_start {
                self.start_time = start;
                self.provisional_start = false;
                adopted_start = true;
            } else if start > self.start_time {
                self.reset_from(snapshot, now);
                return Ok(UpsertOutcome::Reset);
            }
        }

        if self.is_terminal() {
            return Ok(UpsertOutcome::IgnoredTerminal);
        }

        if self
            .implied_processed(snapshot)
            .is_some_and(|processed| processed < self.processed_items)
        {
            return Ok(UpsertOutcome::Stale);
        }

        let before = self.clone();
        self.merge_fields(snapshot, now);

        if *self == before && !adopted_start {
            Ok(UpsertOutcome::Unchanged)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    /// Start a new run of the same job. Errors stay: the sequence is append-only.
    fn reset_from(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) {
        let errors = std::mem::take(&mut self.errors);
        let mut fresh = Job::queued(
            self.id.clone(),
            snapshot.kind.unwrap_or(self.kind),
            snapshot.config.clone().unwrap_or_else(|| self.config.clone()),
            self.total_items,
            snapshot.start_time.unwrap_or(now),
        );
        fresh.errors = errors;
        fresh.retry_of = self.retry_of.clone();
        fresh.attempt = self.attempt;
        fresh.merge_fields(snapshot, now);
        *self = fresh;
    }

    fn merge_fields(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) {
        let processed = self.implied_processed(snapshot);
        if let Some(status) = snapshot.status {
            self.status = status;
        }
        if let Some(total) = snapshot.total_items {
            self.total_items = total;
        }
        if let Some(successful) = snapshot.successful_items {
            self.successful_items = successful;
        }
        if let Some(failed) = snapshot.failed_items {
            self.failed_items = failed;
        }
        if let Some(skipped) = snapshot.skipped_items {
            self.skipped_items = skipped;
        }
        if let Some(processed) = processed {
            self.processed_items = processed;
        }
        if let Some(workers) = snapshot.active_workers {
            self.active_workers = Some(workers);
        }
        if let Some(item) = &snapshot.current_item {
            self.current_item = Some(item.clone());
        }
        if let Some(errors) = &snapshot.errors {
            for error in errors {
                if !self.errors.contains(error) {
                    self.errors.push(error.clone());
                }
            }
        }

        if self.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(snapshot.end_time.unwrap_or(now));
            self.active_workers = None;
        }

        self.record_progress(now);
    }

    fn record_progress(&mut self, now: DateTime<Utc>) {
        let processed = self.processed_items;
        let window: &mut ProgressWindow = &mut self.progress;
        window.record(processed, now);
    }
}
