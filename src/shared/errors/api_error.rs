use super::AppError;
use thiserror::Error;

/// Executor endpoint a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    Create,
    Status,
    /// pause, resume or cancel
    Control,
    Retry,
}

impl ApiOperation {
    /// Sending the request twice has the same effect as sending it once
    pub fn is_idempotent(self) -> bool {
        matches!(self, ApiOperation::Status | ApiOperation::Control)
    }
}

/// Error reported by the job executor's HTTP API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Executor rejected the request ({reason}): {message}")]
    Rejected {
        operation: ApiOperation,
        reason: String,
        message: String,
    },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflicting job state: {message}")]
    Conflict { message: String },

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimit { retry_after: u64 },

    #[error("Job executor unavailable (HTTP {status})")]
    ServiceUnavailable { status: u16 },

    #[error("Invalid API response: {message}")]
    InvalidResponse { message: String },
}

impl ApiError {
    /// Classify a non-success response from the executor.
    pub fn from_status(
        operation: ApiOperation,
        status: u16,
        resource: &str,
        message: Option<String>,
        reason: Option<String>,
    ) -> Self {
        let message = message.unwrap_or_else(|| format!("HTTP {}", status));
        match status {
            400 | 422 if operation == ApiOperation::Status => {
                ApiError::InvalidResponse { message }
            }
            400 | 422 => ApiError::Rejected {
                operation,
                reason: reason.unwrap_or_else(|| "invalid_request".to_string()),
                message,
            },
            404 => ApiError::NotFound {
                resource: resource.to_string(),
            },
            409 => ApiError::Conflict { message },
            429 => ApiError::RateLimit { retry_after: 0 },
            500..=599 => ApiError::ServiceUnavailable { status },
            _ => ApiError::InvalidResponse { message },
        }
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected {
                operation: ApiOperation::Create,
                ..
            } => AppError::StartRejected(err.to_string()),
            ApiError::Rejected { .. } => AppError::InvalidTransition(err.to_string()),
            ApiError::NotFound { resource } => AppError::NotFound(resource),
            ApiError::Conflict { message } => AppError::InvalidTransition(message),
            ApiError::RateLimit { .. } | ApiError::ServiceUnavailable { .. } => {
                AppError::TransportError(err.to_string())
            }
            ApiError::InvalidResponse { message } => AppError::SerializationError(message),
        }
    }
}
