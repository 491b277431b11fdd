use serde::Serialize;
use std::collections::BTreeMap;

use crate::modules::jobs::domain::{Job, JobKind};
use crate::modules::jobs::metrics::{AggregateMetrics, DerivedMetrics, ErrorSummary, MetricsAggregator};
use crate::modules::jobs::registry::JobStatistics;

/// A job as shown on a dashboard card: raw counters plus derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub metrics: DerivedMetrics,
    pub error_summary: ErrorSummary,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            metrics: MetricsAggregator::for_job(&job),
            error_summary: MetricsAggregator::error_summary(&job),
            job,
        }
    }
}

/// Header numbers for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub totals: AggregateMetrics,
    pub by_kind: BTreeMap<JobKind, AggregateMetrics>,
    pub statistics: JobStatistics,
}
