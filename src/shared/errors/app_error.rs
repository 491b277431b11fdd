use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    /// The executor (or local validation) refused to create a job.
    #[error("Start rejected: {0}")]
    StartRejected(String),

    /// A control verb was invoked from a state that does not allow it.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Network failure or timeout talking to the executor.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A progress update without the fields needed to identify its job.
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::TransportError("Request timeout".to_string())
        } else if err.is_connect() {
            AppError::TransportError("Failed to connect to job executor".to_string())
        } else if err.is_decode() {
            AppError::SerializationError(format!("Failed to decode executor response: {}", err))
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                404 => AppError::NotFound("Job not found on executor".to_string()),
                _ => AppError::TransportError(format!("HTTP {}: {}", status, err)),
            }
        } else {
            AppError::TransportError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
