/// Value objects for the jobs domain
use serde::{Deserialize, Serialize};

/// Opaque job identifier assigned by the executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifiers made only of whitespace cannot address a job
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How the executor schedules items across its workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    Sequential,
    Parallel,
    /// Executor grows and shrinks the worker pool between the configured bounds
    Adaptive,
}

impl Default for ProcessingStrategy {
    fn default() -> Self {
        ProcessingStrategy::Sequential
    }
}

/// Parameters a job was started with; immutable for the job's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobConfig {
    pub batch_size: u32,
    pub min_workers: u32,
    pub max_workers: u32,
    pub strategy: ProcessingStrategy,
    pub supports_pause: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            min_workers: 1,
            max_workers: 1,
            strategy: ProcessingStrategy::Sequential,
            supports_pause: false,
        }
    }
}

impl JobConfig {
    /// Worker-pool configuration used by parallel bulk operations
    pub fn parallel(batch_size: u32, min_workers: u32, max_workers: u32) -> Self {
        Self {
            batch_size,
            min_workers,
            max_workers,
            strategy: ProcessingStrategy::Parallel,
            supports_pause: true,
        }
    }

    pub fn with_pause_support(mut self, supports_pause: bool) -> Self {
        self.supports_pause = supports_pause;
        self
    }

    pub fn with_strategy(mut self, strategy: ProcessingStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Items a job operates on, plus kind-specific options passed through opaquely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub item_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl JobPayload {
    pub fn new<I, S>(item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            item_ids: item_ids.into_iter().map(Into::into).collect(),
            options: serde_json::Map::new(),
        }
    }

    /// Attach a kind-specific option (icon style, sync direction filters, ...)
    pub fn with_option(mut self, key: &str, value: serde_json::Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn item_count(&self) -> u64 {
        self.item_ids.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}
