use crate::modules::jobs::domain::{Job, JobKind};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// Estimated time remaining; `Unknown` while nothing is moving
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    Known(Duration),
    Unknown,
}

impl Eta {
    fn from_rate(remaining: u64, throughput: f64) -> Self {
        if remaining == 0 {
            return Eta::Known(Duration::ZERO);
        }
        if throughput <= 0.0 || !throughput.is_finite() {
            return Eta::Unknown;
        }
        Duration::try_from_secs_f64(remaining as f64 / throughput)
            .map(Eta::Known)
            .unwrap_or(Eta::Unknown)
    }

    pub fn as_secs(&self) -> Option<u64> {
        match self {
            Eta::Known(duration) => Some(duration.as_secs()),
            Eta::Unknown => None,
        }
    }
}

// Serialized as whole seconds, `null` when unknown
impl Serialize for Eta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_secs() {
            Some(secs) => serializer.serialize_some(&secs),
            None => serializer.serialize_none(),
        }
    }
}

/// Rates derived from a single job's counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub progress_percentage: f64,
    /// Items per second
    pub throughput: f64,
    pub estimated_time_remaining: Eta,
    pub success_rate: f64,
    pub error_rate: f64,
}

/// Totals across a set of jobs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub job_count: usize,
    pub total_items: u64,
    pub processed_items: u64,
    pub successful_items: u64,
    pub failed_items: u64,
    pub skipped_items: u64,
    pub overall_progress: f64,
    /// Sum of per-job throughputs
    pub throughput: f64,
    pub estimated_time_remaining: Eta,
    pub success_rate: f64,
    pub active_workers: u32,
}

/// Item errors of one job, grouped for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total: usize,
    pub retryable: usize,
    pub by_code: BTreeMap<String, usize>,
}

/// Stateless calculator; every value is recomputed from the job on read
pub struct MetricsAggregator;

impl MetricsAggregator {
    pub fn for_job(job: &Job) -> DerivedMetrics {
        Self::for_job_at(job, Utc::now())
    }

    pub fn for_job_at(job: &Job, now: DateTime<Utc>) -> DerivedMetrics {
        let throughput = Self::throughput_at(job, now);
        let estimated_time_remaining = if job.is_terminal() {
            Eta::Known(Duration::ZERO)
        } else {
            Eta::from_rate(
                job.total_items.saturating_sub(job.processed_items),
                throughput,
            )
        };

        DerivedMetrics {
            progress_percentage: job.progress_percentage(),
            throughput,
            estimated_time_remaining,
            success_rate: percentage(job.successful_items, job.processed_items),
            error_rate: percentage(job.failed_items, job.processed_items),
        }
    }

    pub fn throughput(job: &Job) -> f64 {
        Self::throughput_at(job, Utc::now())
    }

    /// Items per second between the two most recent progress observations.
    /// With a single observation the window starts at the job's start time.
    /// An unfinished job that stops reporting decays towards zero: the window
    /// is stretched to the time since its last observation.
    pub fn throughput_at(job: &Job, now: DateTime<Utc>) -> f64 {
        let window = job.progress_window();
        let Some(latest) = window.latest else {
            return 0.0;
        };
        let (base_processed, base_time) = match window.previous {
            Some(previous) => (previous.processed, previous.observed_at),
            None => (0, job.start_time),
        };

        let mut elapsed = seconds_between(base_time, latest.observed_at);
        if !job.is_terminal() {
            elapsed = elapsed.max(seconds_between(latest.observed_at, now));
        }
        if elapsed <= 0.0 || latest.processed < base_processed {
            return 0.0;
        }
        let rate = (latest.processed - base_processed) as f64 / elapsed;
        if rate.is_finite() {
            rate
        } else {
            0.0
        }
    }

    pub fn aggregate<'a, I>(jobs: I) -> AggregateMetrics
    where
        I: IntoIterator<Item = &'a Job>,
    {
        Self::aggregate_at(jobs, Utc::now())
    }

    /// Counters saturate at their maximum instead of wrapping
    pub fn aggregate_at<'a, I>(jobs: I, now: DateTime<Utc>) -> AggregateMetrics
    where
        I: IntoIterator<Item = &'a Job>,
    {
        let mut aggregate = AggregateMetrics {
            job_count: 0,
            total_items: 0,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            skipped_items: 0,
            overall_progress: 0.0,
            throughput: 0.0,
            estimated_time_remaining: Eta::Unknown,
            success_rate: 0.0,
            active_workers: 0,
        };
        let mut remaining: u64 = 0;
        let mut all_terminal = true;

        for job in jobs {
            aggregate.job_count += 1;
            aggregate.total_items = aggregate.total_items.saturating_add(job.total_items);
            aggregate.processed_items =
                aggregate.processed_items.saturating_add(job.processed_items);
            aggregate.successful_items =
                aggregate.successful_items.saturating_add(job.successful_items);
            aggregate.failed_items = aggregate.failed_items.saturating_add(job.failed_items);
            aggregate.skipped_items = aggregate.skipped_items.saturating_add(job.skipped_items);
            aggregate.active_workers = aggregate
                .active_workers
                .saturating_add(job.active_workers.unwrap_or(0));
            if !job.is_terminal() {
                all_terminal = false;
                aggregate.throughput += Self::throughput_at(job, now);
                remaining =
                    remaining.saturating_add(job.total_items.saturating_sub(job.processed_items));
            }
        }

        aggregate.overall_progress =
            percentage(aggregate.processed_items, aggregate.total_items);
        aggregate.success_rate =
            percentage(aggregate.successful_items, aggregate.processed_items);
        aggregate.estimated_time_remaining = if all_terminal && aggregate.job_count > 0 {
            Eta::Known(Duration::ZERO)
        } else {
            Eta::from_rate(remaining, aggregate.throughput)
        };
        aggregate
    }

    /// One aggregate per dashboard surface
    pub fn by_kind<'a, I>(jobs: I) -> BTreeMap<JobKind, AggregateMetrics>
    where
        I: IntoIterator<Item = &'a Job>,
    {
        Self::by_kind_at(jobs, Utc::now())
    }

    pub fn by_kind_at<'a, I>(jobs: I, now: DateTime<Utc>) -> BTreeMap<JobKind, AggregateMetrics>
    where
        I: IntoIterator<Item = &'a Job>,
    {
        let mut grouped: BTreeMap<JobKind, Vec<&Job>> = BTreeMap::new();
        for job in jobs {
            grouped.entry(job.kind).or_default().push(job);
        }
        grouped
            .into_iter()
            .map(|(kind, jobs)| (kind, Self::aggregate_at(jobs, now)))
            .collect()
    }

    pub fn error_summary(job: &Job) -> ErrorSummary {
        let mut summary = ErrorSummary {
            total: job.errors.len(),
            ..Default::default()
        };
        for error in &job.errors {
            if error.retryable {
                summary.retryable += 1;
            }
            *summary.by_code.entry(error.code.clone()).or_insert(0) += 1;
        }
        summary
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// `part / whole * 100`, guarded against division by zero and clamped
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}
