/// In-memory job registry
///
/// Single source of truth for every job the dashboard knows about. Progress
/// snapshots from push and poll are merged here; the lifecycle controller
/// applies its optimistic transitions through the crate-private methods below.
/// Each merge runs under the job's map entry lock, so readers never observe a
/// partially applied snapshot.
use crate::modules::jobs::domain::{
    ControlAction, Job, JobId, JobKind, JobStatus, Snapshot, UpsertOutcome,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::LogContext;
use crate::{log_debug, log_info, log_warn};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification for registry observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Upserted(JobId),
    Removed(JobId),
}

/// Query filter; only status and kind are filterable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    /// Restrict to non-terminal statuses
    pub active_only: bool,
}

impl JobFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.map_or(true, |status| job.status == status)
            && self.kind.map_or(true, |kind| job.kind == kind)
            && (!self.active_only || job.status.is_active())
    }
}

/// Job counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    pub queued_count: usize,
    pub running_count: usize,
    pub paused_count: usize,
    pub completed_count: usize,
    pub completed_with_errors_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub total_count: usize,
}

/// Record of an optimistic status change, used to roll it back
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OptimisticChange {
    pub job_id: JobId,
    pub action: ControlAction,
    pub previous_status: JobStatus,
    pub previous_end_time: Option<DateTime<Utc>>,
    pub applied_status: JobStatus,
    pub applied_end_time: Option<DateTime<Utc>>,
}

pub struct JobRegistry {
    jobs: DashMap<JobId, Job>,
    events: broadcast::Sender<RegistryEvent>,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: DashMap::new(),
            events,
        }
    }

    /// Merge a snapshot into the stored job, creating it if unseen.
    ///
    /// Late updates for terminal jobs and out-of-order updates are dropped
    /// (reported through the outcome, not as errors). A snapshot without a
    /// job id is rejected with `MalformedSnapshot` and nothing is stored.
    pub fn upsert(&self, snapshot: Snapshot) -> AppResult<UpsertOutcome> {
        let job_id = snapshot.require_job_id()?.clone();
        let now = Utc::now();

        let outcome = match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().apply_snapshot(&snapshot, now)?,
            Entry::Vacant(entry) => {
                let job = Job::from_snapshot(&snapshot, now)?;
                entry.insert(job);
                UpsertOutcome::Created
            }
        };

        match outcome {
            UpsertOutcome::IgnoredTerminal => {
                LogContext::update_dropped(job_id.as_str(), "job already terminal")
            }
            UpsertOutcome::Stale => {
                LogContext::update_dropped(job_id.as_str(), "fewer processed items than stored")
            }
            UpsertOutcome::Unchanged => {}
            UpsertOutcome::Created | UpsertOutcome::Updated | UpsertOutcome::Reset => {
                if let Some(job) = self.jobs.get(&job_id) {
                    LogContext::job_progress(
                        job_id.as_str(),
                        job.processed_items,
                        job.total_items,
                        &job.status.to_string(),
                    );
                }
                self.notify(RegistryEvent::Upserted(job_id));
            }
        }

        Ok(outcome)
    }

    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs.get(job_id).map(|job| job.value().clone())
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Jobs matching the filter, most recently started first
    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        jobs.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }

    /// Explicit eviction. Unknown ids are ignored.
    pub fn remove(&self, job_id: &JobId) -> Option<Job> {
        let removed = self.jobs.remove(job_id).map(|(_, job)| job);
        if removed.is_some() {
            log_debug!("Removed job {} from registry", job_id);
            self.notify(RegistryEvent::Removed(job_id.clone()));
        }
        removed
    }

    /// Evict terminal jobs that finished more than `max_age` ago
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.is_terminal() && job.end_time.is_some_and(|end| end <= cutoff)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for job_id in expired {
            if self.remove(&job_id).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            log_info!("Cleaned up {} finished jobs older than {:?}", removed, max_age);
        }
        removed
    }

    pub fn statistics(&self) -> JobStatistics {
        let mut stats = JobStatistics::default();
        for entry in self.jobs.iter() {
            match entry.value().status {
                JobStatus::Queued => stats.queued_count += 1,
                JobStatus::Running => stats.running_count += 1,
                JobStatus::Paused => stats.paused_count += 1,
                JobStatus::Completed => stats.completed_count += 1,
                JobStatus::CompletedWithErrors => stats.completed_with_errors_count += 1,
                JobStatus::Failed => stats.failed_count += 1,
                JobStatus::Cancelled => stats.cancelled_count += 1,
            }
            stats.total_count += 1;
        }
        stats
    }

    /// Observe registry changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Insert a job unless one with the same id already exists
    pub(crate) fn insert_if_absent(&self, job: Job) -> bool {
        let job_id = job.id.clone();
        let inserted = match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(job);
                true
            }
        };

        if inserted {
            self.notify(RegistryEvent::Upserted(job_id));
        } else {
            log_debug!("Job {} already known, keeping stored state", job_id);
        }
        inserted
    }

    /// Apply an optimistic status change if the action is allowed right now
    pub(crate) fn apply_optimistic(
        &self,
        job_id: &JobId,
        action: ControlAction,
        now: DateTime<Utc>,
    ) -> AppResult<OptimisticChange> {
        let change = {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;
            job.ensure_allows(action)?;

            let previous_status = job.status;
            let previous_end_time = job.end_time;
            match action {
                ControlAction::Pause => job.status = JobStatus::Paused,
                ControlAction::Resume => job.status = JobStatus::Running,
                ControlAction::Cancel => {
                    job.status = JobStatus::Cancelled;
                    job.end_time = Some(now);
                    job.active_workers = None;
                }
                ControlAction::Retry => {
                    return Err(AppError::InvalidTransition(
                        "retry has no optimistic state".to_string(),
                    ))
                }
            }

            OptimisticChange {
                job_id: job_id.clone(),
                action,
                previous_status,
                previous_end_time,
                applied_status: job.status,
                applied_end_time: job.end_time,
            }
        };

        self.notify(RegistryEvent::Upserted(job_id.clone()));
        Ok(change)
    }

    /// Undo an optimistic change, unless a real update already replaced it
    pub(crate) fn rollback(&self, change: &OptimisticChange) -> bool {
        let rolled_back = match self.jobs.get_mut(&change.job_id) {
            Some(mut job)
                if job.status == change.applied_status
                    && job.end_time == change.applied_end_time =>
            {
                job.status = change.previous_status;
                job.end_time = change.previous_end_time;
                true
            }
            Some(_) => {
                log_debug!(
                    "Optimistic {} on {} already reconciled, not rolling back",
                    change.action,
                    change.job_id
                );
                false
            }
            None => false,
        };

        if rolled_back {
            self.notify(RegistryEvent::Upserted(change.job_id.clone()));
        }
        rolled_back
    }

    /// Reopen a job the executor retries in place: a new run over the retried items
    pub(crate) fn reopen(
        &self,
        job_id: &JobId,
        retry_items: u64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

            let mut reopened = Job::queued(
                job.id.clone(),
                job.kind,
                job.config.clone(),
                retry_items,
                now,
            )
            .with_provisional_start();
            reopened.errors = std::mem::take(&mut job.errors);
            reopened.retry_of = job.retry_of.clone();
            reopened.attempt = job.attempt + 1;
            *job = reopened;
        }

        self.notify(RegistryEvent::Upserted(job_id.clone()));
        Ok(())
    }

    fn notify(&self, event: RegistryEvent) {
        // No receivers is fine: nobody is watching yet
        if self.events.receiver_count() > 0 && self.events.send(event).is_err() {
            log_warn!("Registry event dropped: no active subscribers");
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::domain::{ItemError, JobConfig};

    fn start_snapshot(id: &str, total: u64) -> Snapshot {
        Snapshot::for_job(id)
            .with_kind(JobKind::BulkOperation)
            .with_status(JobStatus::Running)
            .with_total(total)
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let registry = JobRegistry::new();

        assert_eq!(
            registry.upsert(start_snapshot("a", 10)).unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            registry
                .upsert(Snapshot::for_job("a").with_processed(4))
                .unwrap(),
            UpsertOutcome::Updated
        );

        let job = registry.get(&JobId::from("a")).unwrap();
        assert_eq!(job.processed_items, 4);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_snapshot_is_not_stored() {
        let registry = JobRegistry::new();
        let result = registry.upsert(Snapshot {
            kind: Some(JobKind::SyncDown),
            processed_items: Some(1),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::MalformedSnapshot(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_orders_by_start_time_descending() {
        let registry = JobRegistry::new();
        let t0 = Utc::now();
        for (id, offset) in [("old", 0), ("new", 120), ("mid", 60)] {
            registry
                .upsert(
                    start_snapshot(id, 1).with_start_time(t0 + chrono::Duration::seconds(offset)),
                )
                .unwrap();
        }

        let ids: Vec<String> = registry
            .list(&JobFilter::all())
            .into_iter()
            .map(|job| job.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_list_filters_by_status_and_kind() {
        let registry = JobRegistry::new();
        registry.upsert(start_snapshot("bulk", 5)).unwrap();
        registry
            .upsert(
                Snapshot::for_job("icons")
                    .with_kind(JobKind::IconGenerationBatch)
                    .with_status(JobStatus::Completed),
            )
            .unwrap();

        assert_eq!(
            registry
                .list(&JobFilter::all().with_kind(JobKind::IconGenerationBatch))
                .len(),
            1
        );
        assert_eq!(
            registry
                .list(&JobFilter::all().with_status(JobStatus::Running))
                .len(),
            1
        );
        assert_eq!(registry.list(&JobFilter::active())[0].id, JobId::from("bulk"));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = JobRegistry::new();
        assert!(registry.remove(&JobId::from("missing")).is_none());
    }

    #[test]
    fn test_cleanup_only_evicts_old_terminal_jobs() {
        let registry = JobRegistry::new();
        let long_ago = Utc::now() - chrono::Duration::hours(3);

        registry
            .upsert(
                start_snapshot("finished", 1)
                    .with_status(JobStatus::Completed)
                    .with_end_time(long_ago),
            )
            .unwrap();
        registry
            .upsert(start_snapshot("recent", 1).with_status(JobStatus::Failed))
            .unwrap();
        registry.upsert(start_snapshot("running", 1)).unwrap();

        let removed = registry.cleanup(Duration::from_secs(3600));

        assert_eq!(removed, 1);
        assert!(!registry.contains(&JobId::from("finished")));
        assert!(registry.contains(&JobId::from("recent")));
        assert!(registry.contains(&JobId::from("running")));
    }

    #[test]
    fn test_statistics_count_each_status() {
        let registry = JobRegistry::new();
        registry.upsert(start_snapshot("a", 1)).unwrap();
        registry.upsert(start_snapshot("b", 1)).unwrap();
        registry
            .upsert(start_snapshot("c", 1).with_status(JobStatus::Failed))
            .unwrap();

        let stats = registry.statistics();
        assert_eq!(stats.running_count, 2);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.total_count, 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_but_not_duplicates() {
        let registry = JobRegistry::new();
        let mut events = registry.subscribe();

        registry.upsert(start_snapshot("a", 2)).unwrap();
        registry.upsert(start_snapshot("a", 2)).unwrap();
        registry.remove(&JobId::from("a"));

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Upserted(JobId::from("a"))
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::Removed(JobId::from("a"))
        );
    }

    #[test]
    fn test_optimistic_cancel_and_rollback() {
        let registry = JobRegistry::new();
        registry.upsert(start_snapshot("a", 2)).unwrap();
        let job_id = JobId::from("a");

        let change = registry
            .apply_optimistic(&job_id, ControlAction::Cancel, Utc::now())
            .unwrap();
        let cancelled = registry.get(&job_id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.end_time.is_some());

        assert!(registry.rollback(&change));
        let restored = registry.get(&job_id).unwrap();
        assert_eq!(restored.status, JobStatus::Running);
        assert_eq!(restored.end_time, None);
    }

    #[test]
    fn test_rollback_skipped_after_real_update() {
        let registry = JobRegistry::new();
        registry
            .upsert(start_snapshot("a", 2).with_config(JobConfig::default().with_pause_support(true)))
            .unwrap();
        let job_id = JobId::from("a");

        let change = registry
            .apply_optimistic(&job_id, ControlAction::Pause, Utc::now())
            .unwrap();
        registry
            .upsert(Snapshot::for_job("a").with_status(JobStatus::Running).with_processed(1))
            .unwrap();

        assert!(!registry.rollback(&change));
        assert_eq!(registry.get(&job_id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_reopen_keeps_errors_and_bumps_attempt() {
        let registry = JobRegistry::new();
        registry
            .upsert(
                start_snapshot("a", 3)
                    .with_status(JobStatus::CompletedWithErrors)
                    .with_counts(2, 1, 0)
                    .with_errors(vec![ItemError::new("p3", "timeout", "slow", true)]),
            )
            .unwrap();
        let job_id = JobId::from("a");

        registry.reopen(&job_id, 1, Utc::now()).unwrap();

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.total_items, 1);
        assert_eq!(job.processed_items, 0);
        assert_eq!(job.end_time, None);
        assert_eq!(job.attempt, 2);
        assert_eq!(job.errors.len(), 1);
    }
}
