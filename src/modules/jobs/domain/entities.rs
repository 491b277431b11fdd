/// Domain entities for tracked bulk jobs
///
/// A job is any long-running unit of work the executor performs for the
/// dashboard: icon generation batches, Shopify sync-down change detection,
/// sync-up uploads and parallel bulk operations all share this shape.
use super::value_objects::{JobConfig, JobId};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status as reported by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::CompletedWithErrors,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Terminal statuses are reached exactly once and never left
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::CompletedWithErrors
                | JobStatus::Failed
                | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Paused => write!(f, "paused"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::CompletedWithErrors => write!(f, "completed_with_errors"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" | "pending" => Ok(JobStatus::Queued),
            "running" | "processing" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "completed_with_errors" => Ok(JobStatus::CompletedWithErrors),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Which dashboard surface a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    IconGenerationBatch,
    SyncDown,
    SyncUp,
    BulkOperation,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::IconGenerationBatch => write!(f, "icon_generation_batch"),
            JobKind::SyncDown => write!(f, "sync_down"),
            JobKind::SyncUp => write!(f, "sync_up"),
            JobKind::BulkOperation => write!(f, "bulk_operation"),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "icon_generation_batch" => Ok(JobKind::IconGenerationBatch),
            "sync_down" => Ok(JobKind::SyncDown),
            "sync_up" => Ok(JobKind::SyncUp),
            "bulk_operation" => Ok(JobKind::BulkOperation),
            _ => Err(format!("Invalid job kind: {}", s)),
        }
    }
}

/// Control verbs the dashboard can send for an existing job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlAction::Pause => write!(f, "pause"),
            ControlAction::Resume => write!(f, "resume"),
            ControlAction::Cancel => write!(f, "cancel"),
            ControlAction::Retry => write!(f, "retry"),
        }
    }
}

/// Item-level failure recorded on a job. Data, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub item_id: String,
    pub message: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retryable: bool,
}

impl ItemError {
    pub fn new(item_id: &str, code: &str, message: &str, retryable: bool) -> Self {
        Self {
            item_id: item_id.to_string(),
            message: message.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
            retryable,
        }
    }
}

/// Processed count observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub processed: u64,
    pub observed_at: DateTime<Utc>,
}

/// The last two distinct progress observations, used to derive throughput
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressWindow {
    pub previous: Option<ProgressSample>,
    pub latest: Option<ProgressSample>,
}

impl ProgressWindow {
    pub fn record(&mut self, processed: u64, observed_at: DateTime<Utc>) {
        if self.latest.map(|s| s.processed) == Some(processed) {
            return;
        }
        self.previous = self.latest.take();
        self.latest = Some(ProgressSample {
            processed,
            observed_at,
        });
    }
}

/// A tracked job as held by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub total_items: u64,
    pub processed_items: u64,
    pub successful_items: u64,
    pub failed_items: u64,
    pub skipped_items: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub errors: Vec<ItemError>,
    pub config: JobConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_workers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<JobId>,
    pub attempt: u32,
    #[serde(skip)]
    pub(crate) progress: ProgressWindow,
    /// `start_time` was stamped locally and is replaced by the first one the executor reports
    #[serde(skip)]
    pub(crate) provisional_start: bool,
}

impl Job {
    /// A freshly started job, before the executor reports anything
    pub fn queued(
        id: JobId,
        kind: JobKind,
        config: JobConfig,
        total_items: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            total_items,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            skipped_items: 0,
            start_time: now,
            end_time: None,
            errors: Vec::new(),
            config,
            active_workers: None,
            current_item: None,
            retry_of: None,
            attempt: 1,
            progress: ProgressWindow::default(),
            provisional_start: false,
        }
    }

    /// Mark the start time as a local guess until the executor reports its own
    pub fn with_provisional_start(mut self) -> Self {
        self.provisional_start = true;
        self
    }

    pub fn has_provisional_start(&self) -> bool {
        self.provisional_start
    }

    pub fn with_retry_of(mut self, original: JobId) -> Self {
        self.retry_of = Some(original);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress in `[0, 100]`; an empty job is 0% until terminal, then 100%
    pub fn progress_percentage(&self) -> f64 {
        if self.total_items == 0 {
            return if self.is_terminal() { 100.0 } else { 0.0 };
        }
        let pct = self.processed_items as f64 / self.total_items as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    pub fn progress_window(&self) -> &ProgressWindow {
        &self.progress
    }

    pub fn retryable_errors(&self) -> impl Iterator<Item = &ItemError> {
        self.errors.iter().filter(|e| e.retryable)
    }

    /// Distinct ids of items whose failure can be retried, in first-seen order
    pub fn retryable_item_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for error in self.retryable_errors() {
            if !ids.contains(&error.item_id) {
                ids.push(error.item_id.clone());
            }
        }
        ids
    }

    /// Check whether a control verb is allowed from the current status
    pub fn ensure_allows(&self, action: ControlAction) -> AppResult<()> {
        let allowed = match action {
            ControlAction::Pause => {
                self.config.supports_pause && self.status == JobStatus::Running
            }
            ControlAction::Resume => {
                self.config.supports_pause && self.status == JobStatus::Paused
            }
            ControlAction::Cancel => !self.is_terminal(),
            ControlAction::Retry => matches!(
                self.status,
                JobStatus::Failed | JobStatus::CompletedWithErrors
            ),
        };

        if allowed {
            Ok(())
        } else if matches!(action, ControlAction::Pause | ControlAction::Resume)
            && !self.config.supports_pause
        {
            Err(AppError::InvalidTransition(format!(
                "{} job {} does not support pause/resume",
                self.kind, self.id
            )))
        } else {
            Err(AppError::InvalidTransition(format!(
                "cannot {} job {} while {}",
                action, self.id, self.status
            )))
        }
    }
}
