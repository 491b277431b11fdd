use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::log_info;
use crate::shared::errors::{AppError, AppResult};

const DEFAULT_EXECUTOR_URL: &str = "http://localhost:8000/api";

/// Runtime settings, read from `SHOPSYNC_*` environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub executor_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    /// How long finished jobs stay in the registry
    pub retention: Duration,
    pub cleanup_interval: Duration,
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub max_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            executor_url: DEFAULT_EXECUTOR_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(2000),
            retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(10 * 60),
            requests_per_second: 10,
            burst_size: 5,
            max_retries: 3,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;

        log_info!(
            "Executor at {} (poll every {:?}, timeout {:?})",
            config.executor_url,
            config.poll_interval,
            config.request_timeout
        );
        Ok(config)
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let executor_url = lookup("SHOPSYNC_EXECUTOR_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.executor_url);
        if !executor_url.starts_with("http://") && !executor_url.starts_with("https://") {
            return Err(AppError::ConfigError(format!(
                "SHOPSYNC_EXECUTOR_URL must be an http(s) URL, got '{}'",
                executor_url
            )));
        }

        let config = Self {
            executor_url,
            request_timeout: millis(&lookup, "SHOPSYNC_REQUEST_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout),
            poll_interval: millis(&lookup, "SHOPSYNC_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval),
            retention: parse::<u64, _>(&lookup, "SHOPSYNC_RETENTION_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
            cleanup_interval: parse::<u64, _>(&lookup, "SHOPSYNC_CLEANUP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            requests_per_second: parse::<u32, _>(&lookup, "SHOPSYNC_REQUESTS_PER_SECOND")?
                .unwrap_or(defaults.requests_per_second),
            burst_size: parse::<u32, _>(&lookup, "SHOPSYNC_BURST_SIZE")?
                .unwrap_or(defaults.burst_size),
            max_retries: parse::<u32, _>(&lookup, "SHOPSYNC_MAX_RETRIES")?
                .unwrap_or(defaults.max_retries),
        };

        if config.poll_interval.is_zero() || config.request_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "Poll interval and request timeout must be positive".to_string(),
            ));
        }
        if config.requests_per_second == 0 || config.burst_size == 0 {
            return Err(AppError::ConfigError(
                "Rate limit must allow at least one request".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::ConfigError(format!("{}='{}': {}", key, raw, e))),
    }
}

fn millis<F>(lookup: &F, key: &str) -> AppResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, _>(lookup, key)?.map(Duration::from_millis))
}
