//! Retry policy for calls to the job executor
//!
//! Backs off exponentially with a little jitter, and honours `Retry-After`
//! when the executor sends one with a 429. Requests that create work are only
//! resent when the executor cannot have acted on them.

use std::time::Duration;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay to wait
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay added as random jitter (0.0 disables it)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// No retries, no waiting
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay before the retry following `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(server_delay) = retry_after {
            return server_delay.min(self.max_delay);
        }

        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis((self.base_delay.as_millis() as f64 * multiplier) as u64)
            .min(self.max_delay);

        if self.jitter > 0.0 {
            let jitter_ms = (delay.as_millis() as f64 * self.jitter * rand::random::<f64>()) as u64;
            delay + Duration::from_millis(jitter_ms)
        } else {
            delay
        }
    }

    /// Longest total backoff across all retries, `Retry-After` excluded
    pub fn backoff_budget(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| {
                let multiplier = self.backoff_multiplier.powi(attempt as i32);
                let delay =
                    Duration::from_millis((self.base_delay.as_millis() as f64 * multiplier) as u64)
                        .min(self.max_delay);
                if self.jitter > 0.0 {
                    delay.mul_f64(1.0 + self.jitter)
                } else {
                    delay
                }
            })
            .sum()
    }

    /// Time an executor call may take when every attempt runs to `request_timeout`
    pub fn operation_timeout(&self, request_timeout: Duration) -> Duration {
        request_timeout
            .saturating_mul(self.max_retries.saturating_add(1))
            .saturating_add(self.backoff_budget())
    }
}

/// Rate limit details from a 429 response
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let retry_after = headers
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        Self { retry_after }
    }
}

/// Statuses worth retrying: rate limiting, timeouts and server errors
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500..=599)
}

/// Network-level failures worth retrying
pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    match error.status() {
        Some(status) => is_retryable_status(status.as_u16()),
        None => error.is_timeout() || error.is_connect(),
    }
}

/// Whether a response status warrants resending. A non-idempotent request
/// is only resent after a 429, which the executor refuses before acting.
pub fn should_retry_status(status: u16, idempotent: bool) -> bool {
    if idempotent {
        is_retryable_status(status)
    } else {
        status == 429
    }
}

/// Whether a transport failure warrants resending. A non-idempotent request
/// is only resent when the connection was never established.
pub fn should_retry_error(error: &reqwest::Error, idempotent: bool) -> bool {
    if idempotent {
        is_retryable_error(error)
    } else {
        error.is_connect()
    }
}
