use serde::{Deserialize, Serialize};

use crate::modules::jobs::domain::{JobConfig, JobId, JobKind, JobPayload};

/// Body of `POST {base}/jobs`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub kind: JobKind,
    pub payload: JobPayload,
    pub config: JobConfig,
}

/// Returned by create and retry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreatedResponse {
    #[serde(alias = "id")]
    pub job_id: JobId,
}

/// Body of `POST {base}/jobs/{id}/retry`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryJobRequest {
    pub item_ids: Vec<String>,
}

/// Returned by pause, resume and cancel
#[derive(Debug, Clone, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body sent with non-success statuses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "message", alias = "detail")]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}
