use log::{debug, info, warn};
use std::sync::Once;
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

/// Initialize the logging system
/// This should be called once at application startup
pub fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info) // Default level
            .filter_module("shopsync_lib", log::LevelFilter::Debug) // More verbose for our crate
            .filter_module("reqwest", log::LevelFilter::Warn) // Reduce HTTP noise
            .filter_module("hyper", log::LevelFilter::Warn)
            .filter_module("tokio", log::LevelFilter::Warn) // Reduce tokio noise
            .format_timestamp_secs()
            .format_target(false)
            .format_module_path(false)
            .try_init();

        info!("Logging system initialized");
    });
}

/// Macro for structured logging with context
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

/// Structured logging helpers for common patterns
pub struct LogContext;

impl LogContext {
    /// Log a lifecycle command sent to the executor
    pub fn job_command(action: &str, job_id: &str, outcome: Option<&str>) {
        match outcome {
            Some(outcome) => info!("Job: {} {} -> {}", action, job_id, outcome),
            None => debug!("Job: Sending {} for {}", action, job_id),
        }
    }

    /// Log executor API calls
    pub fn api_call(method: &str, endpoint: &str, status: &str, duration_ms: Option<u64>) {
        match duration_ms {
            Some(duration) => debug!(
                "API: {} {} {} in {}ms",
                method, endpoint, status, duration
            ),
            None => debug!("API: Starting {} {}", method, endpoint),
        }
    }

    /// Log progress of a tracked job
    pub fn job_progress(job_id: &str, processed: u64, total: u64, status: &str) {
        debug!("Progress: {} [{}/{}] {}", job_id, processed, total, status);
    }

    /// Log a progress update that was dropped instead of merged
    pub fn update_dropped(job_id: &str, reason: &str) {
        debug!("Progress: dropped update for {} ({})", job_id, reason);
    }

    /// Log an optimistic change being undone
    pub fn rollback(action: &str, job_id: &str, cause: &dyn std::error::Error) {
        warn!("Job: rolled back optimistic {} on {}: {}", action, job_id, cause);
    }

    /// Log how long an executor round-trip took; slow ones are raised to warn
    pub fn round_trip(operation: &str, elapsed: Duration, detail: &str) {
        if elapsed >= SLOW_ROUND_TRIP {
            warn!("Slow: {} took {}ms ({})", operation, elapsed.as_millis(), detail);
        } else {
            debug!("Timing: {} took {}ms ({})", operation, elapsed.as_millis(), detail);
        }
    }
}

const SLOW_ROUND_TRIP: Duration = Duration::from_secs(5);

/// Measures an executor round-trip from construction to `finish`
pub struct TimedOperation {
    started: Instant,
    operation: String,
}

impl TimedOperation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            operation: operation.into(),
        }
    }

    pub fn finish(self, detail: &str) -> Duration {
        let elapsed = self.started.elapsed();
        LogContext::round_trip(&self.operation, elapsed, detail);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_is_idempotent() {
        init_logger();
        init_logger();
    }

    #[test]
    fn test_timed_operation_reports_duration() {
        let op = TimedOperation::new("start sync_up job");
        let elapsed = op.finish("sync_up-1");
        assert!(elapsed < SLOW_ROUND_TRIP);
    }
}
