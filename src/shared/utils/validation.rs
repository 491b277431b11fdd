use std::collections::HashSet;

use crate::modules::jobs::domain::{JobConfig, JobKind, JobPayload, ProcessingStrategy};
use crate::shared::errors::AppError;

pub const MAX_BATCH_SIZE: u32 = 250;
pub const MAX_WORKERS: u32 = 32;

pub struct Validator;

impl Validator {
    /// Local checks run before a start request reaches the executor
    pub fn validate_start(
        kind: JobKind,
        payload: &JobPayload,
        config: &JobConfig,
    ) -> Result<(), AppError> {
        Self::validate_items(kind, payload)?;
        Self::validate_config(config)
    }

    pub fn validate_items(kind: JobKind, payload: &JobPayload) -> Result<(), AppError> {
        if payload.is_empty() {
            return Err(AppError::StartRejected(format!(
                "{} job needs at least one item",
                kind
            )));
        }

        let mut seen = HashSet::with_capacity(payload.item_ids.len());
        for item_id in &payload.item_ids {
            if item_id.trim().is_empty() {
                return Err(AppError::StartRejected(
                    "Item ids cannot be blank".to_string(),
                ));
            }
            if !seen.insert(item_id.as_str()) {
                return Err(AppError::StartRejected(format!(
                    "Duplicate item id: {}",
                    item_id
                )));
            }
        }
        Ok(())
    }

    pub fn validate_config(config: &JobConfig) -> Result<(), AppError> {
        if config.batch_size == 0 {
            return Err(AppError::StartRejected(
                "Batch size must be positive".to_string(),
            ));
        }
        if config.batch_size > MAX_BATCH_SIZE {
            return Err(AppError::StartRejected(format!(
                "Batch size cannot exceed {}",
                MAX_BATCH_SIZE
            )));
        }
        if config.min_workers == 0 {
            return Err(AppError::StartRejected(
                "At least one worker is required".to_string(),
            ));
        }
        if config.min_workers > config.max_workers {
            return Err(AppError::StartRejected(format!(
                "minWorkers ({}) exceeds maxWorkers ({})",
                config.min_workers, config.max_workers
            )));
        }
        if config.max_workers > MAX_WORKERS {
            return Err(AppError::StartRejected(format!(
                "maxWorkers cannot exceed {}",
                MAX_WORKERS
            )));
        }
        if config.strategy == ProcessingStrategy::Sequential && config.max_workers > 1 {
            return Err(AppError::StartRejected(
                "Sequential processing runs a single worker".to_string(),
            ));
        }
        Ok(())
    }
}
