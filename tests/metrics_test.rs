/// Derived metrics and dashboard views
///
/// Tests cover:
/// - Progress percentage bounds, including empty jobs
/// - Aggregate progress across active jobs
/// - Per-kind breakdown and serialized dashboard overview
/// - Retention cleanup of finished jobs
mod utils;

use shopsync_lib::modules::jobs::{
    Eta, JobFilter, JobKind, JobRegistry, JobStatus, MetricsAggregator,
};
use std::sync::Arc;
use std::time::Duration;
use utils::factories::{job_id, permanent_error, retryable_error, SnapshotFactory};
use utils::helpers::{build_service, test_config, wait_until, ScriptedExecutor};

// ================================================================================================
// PERCENTAGES
// ================================================================================================

#[test]
fn progress_percentage_stays_within_bounds() {
    let registry = JobRegistry::new();
    let cases = [
        ("a", 0, 0, JobStatus::Running, 0.0),
        ("b", 0, 0, JobStatus::Completed, 100.0),
        ("c", 10, 0, JobStatus::Running, 0.0),
        ("d", 10, 4, JobStatus::Running, 40.0),
        // Executor over-reports processed items
        ("e", 10, 12, JobStatus::Running, 100.0),
    ];

    for (id, total, processed, status, expected) in cases {
        registry
            .upsert(
                SnapshotFactory::started(id, JobKind::BulkOperation, total)
                    .status(status)
                    .processed(processed)
                    .build(),
            )
            .unwrap();
        let job = registry.get(&job_id(id)).unwrap();
        let percentage = MetricsAggregator::for_job(&job).progress_percentage;

        assert!(percentage.is_finite(), "{} produced {}", id, percentage);
        assert!((0.0..=100.0).contains(&percentage));
        assert!((percentage - expected).abs() < 1e-9, "{}: {}", id, percentage);
    }
}

#[test]
fn aggregate_progress_over_two_active_jobs() {
    let registry = JobRegistry::new();
    registry
        .upsert(
            SnapshotFactory::started("sync-1", JobKind::SyncDown, 100)
                .processed(50)
                .build(),
        )
        .unwrap();
    registry
        .upsert(
            SnapshotFactory::started("up-1", JobKind::SyncUp, 50)
                .processed(50)
                .build(),
        )
        .unwrap();

    let aggregate = MetricsAggregator::aggregate(&registry.list(&JobFilter::active()));

    assert_eq!(aggregate.job_count, 2);
    assert_eq!(aggregate.total_items, 150);
    assert_eq!(aggregate.processed_items, 100);
    assert!((aggregate.overall_progress - 66.666_666).abs() < 0.001);
    assert_eq!(format!("{:.1}", aggregate.overall_progress), "66.7");
}

#[test]
fn nothing_moving_means_unknown_eta() {
    let registry = JobRegistry::new();
    registry
        .upsert(
            SnapshotFactory::started("icons-1", JobKind::IconGenerationBatch, 30).build(),
        )
        .unwrap();

    let metrics = MetricsAggregator::for_job(&registry.get(&job_id("icons-1")).unwrap());

    assert_eq!(metrics.throughput, 0.0);
    assert_eq!(metrics.estimated_time_remaining, Eta::Unknown);
}

// ================================================================================================
// DASHBOARD VIEWS
// ================================================================================================

#[tokio::test]
async fn overview_breaks_totals_down_by_kind() {
    let service = build_service(ScriptedExecutor::new());
    let registry = service.registry();
    registry
        .upsert(
            SnapshotFactory::started("icons-1", JobKind::IconGenerationBatch, 40)
                .counts(10, 2, 0)
                .errors(vec![retryable_error("cat-1"), permanent_error("cat-2")])
                .build(),
        )
        .unwrap();
    registry
        .upsert(
            SnapshotFactory::started("icons-2", JobKind::IconGenerationBatch, 10)
                .counts(3, 0, 0)
                .build(),
        )
        .unwrap();
    registry
        .upsert(
            SnapshotFactory::started("sync-1", JobKind::SyncDown, 50)
                .status(JobStatus::Completed)
                .counts(50, 0, 0)
                .build(),
        )
        .unwrap();

    let overview = service.overview(&JobFilter::active());

    assert_eq!(overview.totals.job_count, 2);
    assert_eq!(overview.totals.total_items, 50);
    assert_eq!(overview.totals.processed_items, 15);
    assert_eq!(overview.by_kind.len(), 1);
    assert_eq!(overview.by_kind[&JobKind::IconGenerationBatch].job_count, 2);
    assert_eq!(overview.statistics.running_count, 2);
    assert_eq!(overview.statistics.completed_count, 1);

    let json = serde_json::to_value(&overview).unwrap();
    assert_eq!(json["byKind"]["icon_generation_batch"]["processedItems"], 15);
    assert_eq!(json["statistics"]["totalCount"], 3);

    let view = service.job(&job_id("icons-1")).unwrap();
    assert_eq!(view.error_summary.total, 2);
    assert_eq!(view.error_summary.retryable, 1);
    assert_eq!(view.error_summary.by_code["INVALID_HANDLE"], 1);
}

#[tokio::test]
async fn cleanup_task_evicts_only_old_finished_jobs() {
    let config = shopsync_lib::AppConfig {
        retention: Duration::ZERO,
        ..test_config()
    };
    let service = Arc::new(shopsync_lib::BulkOperationService::new(
        ScriptedExecutor::new(),
        &config,
    ));
    service
        .registry()
        .upsert(
            SnapshotFactory::started("up-1", JobKind::SyncUp, 2)
                .status(JobStatus::Completed)
                .counts(2, 0, 0)
                .build(),
        )
        .unwrap();
    service
        .registry()
        .upsert(SnapshotFactory::started("up-2", JobKind::SyncUp, 2).build())
        .unwrap();

    let task = service.start_cleanup_task();

    let evicted = wait_until(Duration::from_secs(2), || {
        !service.registry().contains(&job_id("up-1"))
    })
    .await;
    assert!(evicted);
    assert!(service.registry().contains(&job_id("up-2")));

    service.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn manual_cleanup_respects_retention() {
    let service = build_service(ScriptedExecutor::new());
    service
        .registry()
        .upsert(
            SnapshotFactory::started("bulk-1", JobKind::BulkOperation, 1)
                .status(JobStatus::Failed)
                .counts(0, 1, 0)
                .build(),
        )
        .unwrap();

    assert_eq!(service.cleanup_finished(Duration::from_secs(3600)), 0);
    assert_eq!(service.cleanup_finished(Duration::ZERO), 1);
    assert!(service.jobs(&JobFilter::all()).is_empty());
}
