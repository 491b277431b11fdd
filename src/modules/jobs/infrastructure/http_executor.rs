//! REST adapter for the external job executor
//!
//! Every request goes through a governor rate limiter. Reads and control
//! commands are retried with backoff on 429, 5xx and network failures; create
//! and retry only after a 429 or a failed connect, so the executor never sees
//! a duplicate. Other statuses are mapped to `AppError` through the
//! executor's error body.

use super::models::{
    ControlResponse, CreateJobRequest, ErrorBody, JobCreatedResponse, RetryJobRequest,
};
use super::retry_policy::{should_retry_error, should_retry_status, RateLimitInfo, RetryPolicy};
use crate::modules::jobs::domain::{JobConfig, JobExecutor, JobId, JobKind, JobPayload, Snapshot};
use crate::shared::config::AppConfig;
use crate::shared::errors::{ApiError, ApiOperation, AppError, AppResult};
use crate::shared::utils::logger::LogContext;
use crate::log_warn;
use async_trait::async_trait;
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

type DirectRateLimiter = GovernorRateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
    governor::middleware::NoOpMiddleware,
>;

const USER_AGENT: &str = concat!("shopsync/", env!("CARGO_PKG_VERSION"));
const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub struct HttpJobExecutor {
    client: Client,
    base_url: String,
    rate_limiter: DirectRateLimiter,
    retry_policy: RetryPolicy,
}

impl HttpJobExecutor {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        requests_per_second: u32,
        burst_size: u32,
        retry_policy: RetryPolicy,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Self::create_rate_limiter(requests_per_second, burst_size)?,
            retry_policy,
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        Self::new(
            &config.executor_url,
            config.request_timeout,
            config.requests_per_second,
            config.burst_size,
            RetryPolicy::with_max_retries(config.max_retries),
        )
    }

    fn create_rate_limiter(requests_per_second: u32, burst_size: u32) -> AppResult<DirectRateLimiter> {
        let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            AppError::ConfigError("requests per second must be positive".to_string())
        })?;
        let burst = NonZeroU32::new(burst_size)
            .ok_or_else(|| AppError::ConfigError("burst size must be positive".to_string()))?;

        Ok(GovernorRateLimiter::direct(
            Quota::per_second(rate).allow_burst(burst),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.base_url)
    }

    /// `{base}/jobs/{id}[/{action}]` with the id percent-encoded
    fn job_url(&self, job_id: &JobId, action: Option<&str>) -> String {
        let encoded = urlencoding::encode(job_id.as_str());
        match action {
            Some(action) => format!("{}/jobs/{}/{}", self.base_url, encoded, action),
            None => format!("{}/jobs/{}", self.base_url, encoded),
        }
    }

    async fn control(&self, job_id: &JobId, action: &str) -> AppResult<()> {
        let url = self.job_url(job_id, Some(action));
        let response: ControlResponse = self
            .send(
                ApiOperation::Control,
                Method::POST,
                &url,
                None,
                &format!("job {}", job_id),
            )
            .await?;

        if response.success {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(response.error.unwrap_or_else(
                || format!("Executor refused to {} job {}", action, job_id),
            )))
        }
    }

    async fn send<T>(
        &self,
        operation: ApiOperation,
        method: Method,
        url: &str,
        body: Option<Value>,
        resource: &str,
    ) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let max_retries = self.retry_policy.max_retries;
        let idempotent = operation.is_idempotent();

        for attempt in 0..=max_retries {
            self.rate_limiter.until_ready().await;

            let started = Instant::now();
            let mut request = self
                .client
                .request(method.clone(), url)
                .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
                .header(ACCEPT, "application/json");
            if let Some(json) = &body {
                request = request.header(CONTENT_TYPE, "application/json").json(json);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    LogContext::api_call(
                        method.as_str(),
                        url,
                        &status.to_string(),
                        Some(started.elapsed().as_millis() as u64),
                    );

                    if response.status().is_success() {
                        return Self::parse_response(response).await;
                    }

                    if should_retry_status(status, idempotent) && attempt < max_retries {
                        let retry_after = if status == 429 {
                            RateLimitInfo::from_headers(response.headers()).retry_after
                        } else {
                            None
                        };
                        let delay = self.retry_policy.calculate_delay(attempt, retry_after);
                        log_warn!(
                            "{} {} returned {} (attempt {}/{}), retrying in {:?}",
                            method,
                            url,
                            status,
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                        continue;
                    }

                    return Err(Self::error_from_response(operation, response, resource).await);
                }
                Err(e) => {
                    if should_retry_error(&e, idempotent) && attempt < max_retries {
                        let delay = self.retry_policy.calculate_delay(attempt, None);
                        log_warn!(
                            "{} {} failed (attempt {}/{}): {}. Retrying in {:?}",
                            method,
                            url,
                            attempt + 1,
                            max_retries + 1,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return Err(AppError::from(e));
                }
            }
        }

        Err(AppError::TransportError(format!(
            "{} {} failed after {} attempts",
            method,
            url,
            max_retries + 1
        )))
    }

    async fn parse_response<T>(response: Response) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let text = response.text().await.map_err(|e| {
            AppError::TransportError(format!("Failed to read executor response: {}", e))
        })?;

        serde_json::from_str(&text).map_err(|e| {
            AppError::SerializationError(format!(
                "Failed to parse executor response: {}. Response: {}",
                e,
                truncate(&text, 200)
            ))
        })
    }

    async fn error_from_response(
        operation: ApiOperation,
        response: Response,
        resource: &str,
    ) -> AppError {
        let status = response.status().as_u16();
        let rate_limit = RateLimitInfo::from_headers(response.headers());
        let body: ErrorBody = match response.text().await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
                error: (!text.trim().is_empty()).then(|| truncate(&text, 200)),
                reason: None,
            }),
            Err(_) => ErrorBody::default(),
        };

        let api_error = match ApiError::from_status(
            operation,
            status,
            resource,
            body.error,
            body.reason,
        ) {
            ApiError::RateLimit { .. } => ApiError::RateLimit {
                retry_after: rate_limit.retry_after.map_or(0, |d| d.as_secs()),
            },
            other => other,
        };
        api_error.into()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

#[async_trait]
impl JobExecutor for HttpJobExecutor {
    async fn create(
        &self,
        kind: JobKind,
        payload: JobPayload,
        config: JobConfig,
    ) -> AppResult<JobId> {
        let body = serde_json::to_value(CreateJobRequest {
            kind,
            payload,
            config,
        })?;
        let created: JobCreatedResponse = self
            .send(
                ApiOperation::Create,
                Method::POST,
                &self.jobs_url(),
                Some(body),
                "jobs",
            )
            .await?;
        Ok(created.job_id)
    }

    async fn status(&self, job_id: &JobId) -> AppResult<Snapshot> {
        let mut snapshot: Snapshot = self
            .send(
                ApiOperation::Status,
                Method::GET,
                &self.job_url(job_id, None),
                None,
                &format!("job {}", job_id),
            )
            .await?;
        if snapshot.job_id.is_none() {
            snapshot.job_id = Some(job_id.clone());
        }
        Ok(snapshot)
    }

    async fn pause(&self, job_id: &JobId) -> AppResult<()> {
        self.control(job_id, "pause").await
    }

    async fn resume(&self, job_id: &JobId) -> AppResult<()> {
        self.control(job_id, "resume").await
    }

    async fn cancel(&self, job_id: &JobId) -> AppResult<()> {
        self.control(job_id, "cancel").await
    }

    async fn retry(&self, job_id: &JobId, item_ids: Vec<String>) -> AppResult<JobId> {
        let body = serde_json::to_value(RetryJobRequest { item_ids })?;
        let created: JobCreatedResponse = self
            .send(
                ApiOperation::Retry,
                Method::POST,
                &self.job_url(job_id, Some("retry")),
                Some(body),
                &format!("job {}", job_id),
            )
            .await?;
        Ok(created.job_id)
    }
}
