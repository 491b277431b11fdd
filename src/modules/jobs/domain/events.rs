/// Push channel events
///
/// The executor pushes named JSON events (`{"type": "operation_progress", ...}`).
/// Every event is converted into a snapshot so push and poll share the same
/// merge path.
use super::entities::{ItemError, JobKind, JobStatus};
use super::snapshot::Snapshot;
use super::value_objects::{JobConfig, JobId};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PushEvent {
    OperationStart {
        job_id: JobId,
        kind: JobKind,
        #[serde(default)]
        total_items: Option<u64>,
        #[serde(default)]
        start_time: Option<DateTime<Utc>>,
        #[serde(default)]
        config: Option<JobConfig>,
    },
    OperationProgress {
        #[serde(flatten)]
        snapshot: Snapshot,
    },
    OperationComplete {
        job_id: JobId,
        final_snapshot: Snapshot,
    },
    /// Batch-specific: one item failed while the batch keeps going
    BatchItemError { job_id: JobId, error: ItemError },
}

impl PushEvent {
    /// Decode a raw push message; undecodable messages are malformed snapshots
    pub fn from_json(message: &str) -> AppResult<Self> {
        serde_json::from_str(message)
            .map_err(|e| AppError::MalformedSnapshot(format!("undecodable push event: {}", e)))
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            PushEvent::OperationStart { job_id, .. }
            | PushEvent::OperationComplete { job_id, .. }
            | PushEvent::BatchItemError { job_id, .. } => Some(job_id),
            PushEvent::OperationProgress { snapshot } => snapshot.job_id.as_ref(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::OperationStart { .. } => "operation_start",
            PushEvent::OperationProgress { .. } => "operation_progress",
            PushEvent::OperationComplete { .. } => "operation_complete",
            PushEvent::BatchItemError { .. } => "batch_item_error",
        }
    }

    pub fn into_snapshot(self) -> Snapshot {
        match self {
            PushEvent::OperationStart {
                job_id,
                kind,
                total_items,
                start_time,
                config,
            } => Snapshot {
                job_id: Some(job_id),
                kind: Some(kind),
                status: Some(JobStatus::Running),
                total_items,
                start_time,
                config,
                ..Default::default()
            },
            PushEvent::OperationProgress { snapshot } => snapshot,
            PushEvent::OperationComplete {
                job_id,
                mut final_snapshot,
            } => {
                final_snapshot.job_id = Some(job_id);
                if final_snapshot.status.is_none() {
                    final_snapshot.status = Some(Self::inferred_final_status(&final_snapshot));
                }
                final_snapshot
            }
            PushEvent::BatchItemError { job_id, error } => {
                Snapshot::for_job(job_id).with_errors(vec![error])
            }
        }
    }

    /// A completion event without an explicit status still has to be terminal
    fn inferred_final_status(snapshot: &Snapshot) -> JobStatus {
        let has_failures = snapshot.failed_items.is_some_and(|failed| failed > 0)
            || snapshot.errors.as_ref().is_some_and(|errors| !errors.is_empty());
        if has_failures {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_operation_start() {
        let event = PushEvent::from_json(
            r#"{"type":"operation_start","jobId":"icons-1","kind":"icon_generation_batch","totalItems":40}"#,
        )
        .unwrap();

        assert_eq!(event.name(), "operation_start");
        let snapshot = event.into_snapshot();
        assert_eq!(snapshot.job_id, Some(JobId::from("icons-1")));
        assert_eq!(snapshot.kind, Some(JobKind::IconGenerationBatch));
        assert_eq!(snapshot.status, Some(JobStatus::Running));
        assert_eq!(snapshot.total_items, Some(40));
    }

    #[test]
    fn test_decode_operation_progress_flattens_snapshot() {
        let event = PushEvent::from_json(
            r#"{"type":"operation_progress","jobId":"sync-9","processedItems":12,"totalItems":50,"activeWorkers":4}"#,
        )
        .unwrap();

        assert_eq!(event.job_id(), Some(&JobId::from("sync-9")));
        let snapshot = event.into_snapshot();
        assert_eq!(snapshot.processed_items, Some(12));
        assert_eq!(snapshot.active_workers, Some(4));
    }

    #[test]
    fn test_completion_without_status_is_inferred() {
        let event = PushEvent::OperationComplete {
            job_id: JobId::from("up-2"),
            final_snapshot: Snapshot {
                failed_items: Some(3),
                ..Default::default()
            },
        };

        let snapshot = event.into_snapshot();
        assert_eq!(snapshot.job_id, Some(JobId::from("up-2")));
        assert_eq!(snapshot.status, Some(JobStatus::CompletedWithErrors));
    }

    #[test]
    fn test_progress_without_job_id_has_no_id() {
        let event =
            PushEvent::from_json(r#"{"type":"operation_progress","processedItems":1}"#).unwrap();
        assert_eq!(event.job_id(), None);
    }

    #[test]
    fn test_unknown_event_is_malformed() {
        let result = PushEvent::from_json(r#"{"type":"heartbeat"}"#);
        assert!(matches!(result, Err(AppError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_batch_item_error_becomes_error_snapshot() {
        let error = ItemError::new("sku-1", "image_failed", "generator timeout", true);
        let snapshot = PushEvent::BatchItemError {
            job_id: JobId::from("icons-1"),
            error: error.clone(),
        }
        .into_snapshot();

        assert_eq!(snapshot.errors, Some(vec![error]));
        assert!(!snapshot.carries_progress());
    }
}
