/// Bulk operation tracking
///
/// Keeps the dashboard's view of long-running Shopify jobs (icon generation
/// batches, sync down, sync up and generic bulk operations) in one registry.
///
/// Architecture:
/// - Domain: job model, snapshots and the merge rule, push events, executor port
/// - Registry: concurrent in-memory store with change notifications
/// - Metrics: derived progress, throughput and ETA
/// - Controller: start/pause/resume/cancel/retry with optimistic updates
/// - Tracker: push and poll delivery into the registry
/// - Infrastructure: REST adapter for the executor
/// - Application: service facade and dashboard views
pub mod application;
pub mod controller;
pub mod domain;
pub mod infrastructure;
pub mod metrics;
pub mod registry;
pub mod tracker;

// Re-exports for easy access
pub use application::{BulkOperationService, DashboardOverview, JobView};
pub use controller::LifecycleController;
pub use domain::{
    ControlAction, ItemError, Job, JobConfig, JobExecutor, JobId, JobKind, JobPayload, JobStatus,
    ProcessingStrategy, PushEvent, Snapshot, UpsertOutcome,
};
pub use infrastructure::{HttpJobExecutor, RetryPolicy};
pub use metrics::{AggregateMetrics, DerivedMetrics, ErrorSummary, Eta, MetricsAggregator};
pub use registry::{JobFilter, JobRegistry, JobStatistics, RegistryEvent};
pub use tracker::ProgressTracker;
