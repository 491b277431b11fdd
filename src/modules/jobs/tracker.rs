/// Progress delivery
///
/// Feeds the registry from two sources: push events from the executor's
/// stream and a fixed-interval poll of `status` as a fallback. Both go through
/// the same idempotent upsert, so a duplicate or overlapping delivery is
/// harmless. A push event for a job stops that job's poll loop; when the push
/// stream ends every tracked job that is still running goes back to polling.
use crate::modules::jobs::domain::{JobExecutor, JobId, PushEvent, UpsertOutcome};
use crate::modules::jobs::registry::JobRegistry;
use crate::shared::errors::{AppError, AppResult};
use dashmap::{DashMap, DashSet};
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Poller {
    generation: u64,
    token: CancellationToken,
}

enum PollStep {
    Continue,
    Stop,
}

pub struct ProgressTracker {
    registry: Arc<JobRegistry>,
    executor: Arc<dyn JobExecutor>,
    poll_interval: Duration,
    request_timeout: Duration,
    pollers: DashMap<JobId, Poller>,
    tracked: DashSet<JobId>,
    push_connected: AtomicBool,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl ProgressTracker {
    pub fn new(
        registry: Arc<JobRegistry>,
        executor: Arc<dyn JobExecutor>,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            poll_interval,
            request_timeout,
            pollers: DashMap::new(),
            tracked: DashSet::new(),
            push_connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Follow a job until it reaches a terminal state.
    ///
    /// Polls unless a push stream is connected, in which case the stream is
    /// expected to deliver its progress.
    pub fn track(self: &Arc<Self>, job_id: JobId) {
        if self.shutdown.is_cancelled() {
            debug!("Tracker shut down, not tracking {}", job_id);
            return;
        }
        self.tracked.insert(job_id.clone());

        if self.is_push_connected() {
            debug!("Push connected, {} will not be polled", job_id);
            return;
        }
        self.start_polling(job_id);
    }

    pub fn untrack(&self, job_id: &JobId) {
        self.tracked.remove(job_id);
        self.stop_polling(job_id);
    }

    pub fn is_tracked(&self, job_id: &JobId) -> bool {
        self.tracked.contains(job_id)
    }

    pub fn is_polling(&self, job_id: &JobId) -> bool {
        self.pollers.contains_key(job_id)
    }

    pub fn is_push_connected(&self) -> bool {
        self.push_connected.load(Ordering::SeqCst)
    }

    /// Apply one push event. The job becomes push-delivered.
    pub fn handle_push(&self, event: PushEvent) -> AppResult<UpsertOutcome> {
        let job_id = event
            .job_id()
            .cloned()
            .ok_or_else(|| AppError::MalformedSnapshot(format!("{} without job id", event.name())))?;

        self.stop_polling(&job_id);
        let outcome = self.registry.upsert(event.into_snapshot())?;

        let terminal = self
            .registry
            .get(&job_id)
            .map_or(true, |job| job.is_terminal());
        if terminal {
            self.tracked.remove(&job_id);
        } else {
            self.tracked.insert(job_id);
        }
        Ok(outcome)
    }

    /// Decode and apply one raw push message
    pub fn handle_push_message(&self, message: &str) -> AppResult<UpsertOutcome> {
        let event = PushEvent::from_json(message)?;
        self.handle_push(event)
    }

    /// Consume a push stream until it ends or the tracker shuts down.
    ///
    /// Malformed messages are logged and skipped. When the stream ends the
    /// tracked jobs fall back to polling.
    pub async fn run_push_stream<S>(self: &Arc<Self>, stream: S)
    where
        S: Stream<Item = String> + Send,
    {
        let mut stream = Box::pin(stream);
        self.push_connected.store(true, Ordering::SeqCst);
        info!("Push stream connected");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                message = stream.next() => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_push_message(&message) {
                            warn!("Dropping push message: {}", e);
                        }
                    }
                    None => break,
                },
            }
        }

        self.push_connected.store(false, Ordering::SeqCst);
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Push stream ended, falling back to polling");
        self.fallback_to_polling();
    }

    /// Start polling every tracked job that has not finished
    pub fn fallback_to_polling(self: &Arc<Self>) {
        let job_ids: Vec<JobId> = self.tracked.iter().map(|id| id.key().clone()).collect();
        for job_id in job_ids {
            let finished = self
                .registry
                .get(&job_id)
                .map_or(false, |job| job.is_terminal());
            if finished {
                self.tracked.remove(&job_id);
            } else {
                self.start_polling(job_id);
            }
        }
    }

    /// Stop every poll loop and refuse further tracking
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.pollers.clear();
        self.tracked.clear();
        info!("Progress tracker shut down");
    }

    fn start_polling(self: &Arc<Self>, job_id: JobId) {
        if self.pollers.contains_key(&job_id) {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let token = self.shutdown.child_token();
        self.pollers.insert(
            job_id.clone(),
            Poller {
                generation,
                token: token.clone(),
            },
        );

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tracker.poll_loop(job_id, generation, token).await;
        });
    }

    fn stop_polling(&self, job_id: &JobId) {
        if let Some((_, poller)) = self.pollers.remove(job_id) {
            poller.token.cancel();
            debug!("Stopped polling {}", job_id);
        }
    }

    async fn poll_loop(&self, job_id: JobId, generation: u64, token: CancellationToken) {
        debug!("Polling {} every {:?}", job_id, self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seen = self.registry.contains(&job_id);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once(&job_id, &mut seen).await {
                PollStep::Continue => {}
                PollStep::Stop => break,
            }
        }

        self.pollers
            .remove_if(&job_id, |_, poller| poller.generation == generation);
        debug!("Poll loop for {} finished", job_id);
    }

    async fn poll_once(&self, job_id: &JobId, seen: &mut bool) -> PollStep {
        match self.registry.get(job_id) {
            Some(job) if job.is_terminal() => {
                self.tracked.remove(job_id);
                return PollStep::Stop;
            }
            Some(_) => *seen = true,
            // Removed from the registry while being tracked
            None if *seen => {
                self.tracked.remove(job_id);
                return PollStep::Stop;
            }
            None => {}
        }

        let snapshot =
            match tokio::time::timeout(self.request_timeout, self.executor.status(job_id)).await {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(AppError::NotFound(message))) => {
                    warn!("Executor no longer knows {}: {}", job_id, message);
                    self.tracked.remove(job_id);
                    return PollStep::Stop;
                }
                Ok(Err(e)) => {
                    warn!("Poll of {} failed, retrying next tick: {}", job_id, e);
                    return PollStep::Continue;
                }
                Err(_) => {
                    warn!(
                        "Poll of {} timed out after {:?}",
                        job_id, self.request_timeout
                    );
                    return PollStep::Continue;
                }
            };

        if *seen && !self.registry.contains(job_id) {
            self.tracked.remove(job_id);
            return PollStep::Stop;
        }

        let mut snapshot = snapshot;
        if snapshot.job_id.is_none() {
            snapshot.job_id = Some(job_id.clone());
        }
        if let Err(e) = self.registry.upsert(snapshot) {
            warn!("Dropping poll result for {}: {}", job_id, e);
        }

        match self.registry.get(job_id) {
            Some(job) if job.is_terminal() => {
                self.tracked.remove(job_id);
                PollStep::Stop
            }
            Some(_) => {
                *seen = true;
                PollStep::Continue
            }
            None => PollStep::Continue,
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
