//! Enrichment job controller.
//!
//! A single `JobManager` owns the job state machine. At most one job runs at
//! a time: every transition happens under one async lock, and a start while
//! running fails fast. While running, the processing loop owns the working
//! job (queue, cursor, snapshot) and hands it back under the lock when it
//! stops, either because the queue is exhausted, the job was paused, or the
//! persistence breaker tripped.

use super::circuit_breaker::{BreakerAction, PersistenceBreaker};
use super::job_store::{JobStore, PersistedJob};
use super::models::{EnrichError, FailedSalon, FailureKind, JobError, JobState};
use super::progress::{DurationAverage, LogLevel, ProgressSnapshot, ProgressStore};
use super::retry_policy::RetryPolicy;
use super::worker::{Charges, EnrichOutcome, EnrichmentWorker};
use crate::config::EnrichmentSettings;
use crate::review_index::ReviewIndexHandle;
use crate::selection::{self, Freshness, QueueEntry, Selection, SelectionRequest};
use crate::server::metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct RunningJob {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    state: JobState,
    /// The current job while not running. The loop owns it while running.
    job: Option<PersistedJob>,
    running: Option<RunningJob>,
}

/// How one queue item ended.
enum ItemResult {
    Done(Result<EnrichOutcome, EnrichError>),
    /// Paused while waiting to retry a transient failure. The item stays
    /// at the cursor.
    Interrupted,
}

/// Why the processing loop stopped.
enum LoopExit {
    Completed,
    Paused,
    BreakerTripped(String),
}

pub struct JobManager {
    inner: Mutex<Inner>,
    worker: Arc<EnrichmentWorker>,
    job_store: Arc<dyn JobStore>,
    progress: ProgressStore,
    index: Arc<ReviewIndexHandle>,
    policy: RetryPolicy,
    settings: EnrichmentSettings,
    shutting_down: AtomicBool,
}

/// Append a line to the job log and mirror it to the process log.
fn job_log(snapshot: &mut ProgressSnapshot, level: LogLevel, message: String) {
    match level {
        LogLevel::Info => info!("{}", message),
        LogLevel::Warn => warn!("{}", message),
        LogLevel::Error => error!("{}", message),
    }
    snapshot.log(level, message);
}

impl JobManager {
    pub fn new(
        worker: Arc<EnrichmentWorker>,
        job_store: Arc<dyn JobStore>,
        index: Arc<ReviewIndexHandle>,
        settings: EnrichmentSettings,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: JobState::Idle,
                job: None,
                running: None,
            }),
            worker,
            job_store,
            progress: ProgressStore::new(ProgressSnapshot::idle(settings.log_capacity)),
            index,
            policy: RetryPolicy::new(&settings),
            settings,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<ReviewIndexHandle> {
        &self.index
    }

    pub fn worker(&self) -> &Arc<EnrichmentWorker> {
        &self.worker
    }

    /// Latest published snapshot. Never waits on the processing loop.
    pub fn progress(&self) -> Arc<ProgressSnapshot> {
        self.progress.get()
    }

    pub async fn state(&self) -> JobState {
        self.inner.lock().await.state
    }

    fn freshness(&self) -> Freshness {
        Freshness::days(chrono::Utc::now().timestamp(), self.settings.freshness_days)
    }

    fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.settings.inter_item_delay_ms)
    }

    fn refresh_estimates(&self, snapshot: &mut ProgressSnapshot, durations: Option<&DurationAverage>) {
        snapshot.update_estimates(
            durations.and_then(|d| d.average()),
            self.inter_item_delay().as_secs_f64(),
            self.worker.costs().per_salon(),
        );
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Start a strategy-driven run over the priority city set.
    pub async fn start_filtered(
        self: &Arc<Self>,
        request: SelectionRequest,
    ) -> Result<Arc<ProgressSnapshot>, JobError> {
        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(JobError::AlreadyRunning);
        }

        let index = self.index.current();
        let selection = selection::build_filtered(
            self.worker.store().as_ref(),
            &index,
            &request,
            self.settings.priority_city_count,
            self.freshness(),
        )?;
        let force_refresh = request.force_refresh;
        info!(
            "Starting filtered enrichment: tier {}, strategy {}, {} per city",
            request.review_tier.as_str(),
            request.strategy.as_str(),
            request.top_per_city_count
        );
        self.launch(&mut inner, selection, Some(request), force_refresh)
    }

    /// Start a run over a caller-supplied salon set.
    pub async fn start_explicit(
        self: &Arc<Self>,
        place_ids: Vec<String>,
        force_refresh: bool,
    ) -> Result<Arc<ProgressSnapshot>, JobError> {
        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(JobError::AlreadyRunning);
        }

        let selection = selection::build_explicit(
            self.worker.store().as_ref(),
            &place_ids,
            force_refresh,
            self.freshness(),
        )?;
        info!("Starting explicit enrichment of {} salons", place_ids.len());
        self.launch(&mut inner, selection, None, force_refresh)
    }

    fn launch(
        self: &Arc<Self>,
        inner: &mut Inner,
        selection: Selection,
        request: Option<SelectionRequest>,
        force_refresh: bool,
    ) -> Result<Arc<ProgressSnapshot>, JobError> {
        let now = chrono::Utc::now().timestamp();
        let job_id = uuid::Uuid::new_v4().to_string();

        let mut snapshot = ProgressSnapshot::idle(self.settings.log_capacity);
        snapshot.job_id = Some(job_id.clone());
        snapshot.total_salons = selection.queue.len();
        snapshot.queue_length = selection.queue.len();
        snapshot.skipped = selection.skipped.len();
        snapshot.started_at = Some(now);
        job_log(
            &mut snapshot,
            LogLevel::Info,
            format!(
                "Job {} queued {} salons across {} cities, {} skipped as fresh",
                job_id,
                selection.queue.len(),
                selection.cities.len(),
                selection.skipped.len()
            ),
        );

        let job = PersistedJob {
            job_id,
            state: JobState::Running,
            request,
            force_refresh,
            queue: selection.queue,
            cursor: 0,
            snapshot,
            created_at: now,
        };
        self.spawn_run(inner, job)
    }

    /// Mark `job` running, persist it with its queue and spawn the loop.
    fn spawn_run(
        self: &Arc<Self>,
        inner: &mut Inner,
        mut job: PersistedJob,
    ) -> Result<Arc<ProgressSnapshot>, JobError> {
        job.state = JobState::Running;
        job.snapshot.state = JobState::Running;
        job.snapshot.is_running = true;
        job.snapshot.pause_reason = None;
        job.snapshot.queue_length = job.queue.len();
        job.snapshot.cursor = job.cursor;
        self.refresh_estimates(&mut job.snapshot, None);

        self.job_store.save_job(&job)?;
        self.progress.publish(job.snapshot.clone());

        let cancel = CancellationToken::new();
        let manager = Arc::clone(self);
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            manager.run_loop(job, loop_cancel).await;
        });

        inner.state = JobState::Running;
        inner.job = None;
        inner.running = Some(RunningJob {
            cancel,
            handle: Some(handle),
        });
        metrics::set_job_running(true);
        Ok(self.progress.get())
    }

    /// Stop the running job at the next item boundary.
    ///
    /// Waits for the in-flight salon to finish, so no item is half-written.
    pub async fn pause(&self) -> Result<Arc<ProgressSnapshot>, JobError> {
        let handle = {
            let mut inner = self.inner.lock().await;
            if inner.state != JobState::Running {
                return Err(JobError::NotRunning);
            }
            match inner.running.as_mut() {
                Some(running) => {
                    running.cancel.cancel();
                    running.handle.take()
                }
                None => None,
            }
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Enrichment loop ended abnormally: {}", e);
            }
        }
        Ok(self.progress.get())
    }

    /// Continue a paused job from its cursor.
    pub async fn resume(self: &Arc<Self>) -> Result<Arc<ProgressSnapshot>, JobError> {
        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(JobError::AlreadyRunning);
        }
        if inner.state != JobState::Paused {
            return Err(JobError::NothingToResume);
        }
        let Some(mut job) = inner.job.take() else {
            return Err(JobError::NothingToResume);
        };

        let remaining = job.queue.len().saturating_sub(job.cursor);
        job_log(
            &mut job.snapshot,
            LogLevel::Info,
            format!("Resuming job {} with {} salons left", job.job_id, remaining),
        );
        self.spawn_run(&mut inner, job)
    }

    /// Requeue failed salons under the retry cap at the front of the queue.
    ///
    /// Salons at or over the cap, or failed permanently, stay in the failed
    /// list and need [`JobManager::force_retry`].
    pub async fn retry_failed(self: &Arc<Self>) -> Result<Arc<ProgressSnapshot>, JobError> {
        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(JobError::AlreadyRunning);
        }
        let Some(job) = inner.job.as_mut() else {
            return Err(JobError::NothingToRetry);
        };

        let eligible: Vec<String> = job
            .snapshot
            .failed_salons
            .iter()
            .filter(|f| self.policy.can_requeue(f.kind, f.retries))
            .map(|f| f.place_id.clone())
            .collect();
        if eligible.is_empty() {
            return Err(JobError::NothingToRetry);
        }

        let requeued = Self::requeue(job, &eligible);
        let message = format!(
            "Retrying {} failed salons, {} left in the failed list",
            requeued,
            job.snapshot.failed_salons.len()
        );
        job_log(&mut job.snapshot, LogLevel::Info, message);

        let job = inner.job.take().ok_or(JobError::NothingToRetry)?;
        self.spawn_run(&mut inner, job)
    }

    /// Requeue the given failed salons regardless of cap or failure kind.
    pub async fn force_retry(
        self: &Arc<Self>,
        place_ids: Vec<String>,
    ) -> Result<Arc<ProgressSnapshot>, JobError> {
        if place_ids.is_empty() {
            return Err(JobError::Validation("place_ids must not be empty".to_string()));
        }

        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(JobError::AlreadyRunning);
        }
        let Some(job) = inner.job.as_mut() else {
            return Err(JobError::NothingToRetry);
        };

        let unknown: Vec<&str> = place_ids
            .iter()
            .filter(|id| !job.snapshot.failed_salons.iter().any(|f| &f.place_id == *id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(JobError::Validation(format!(
                "Not in the failed list: {}",
                unknown.join(", ")
            )));
        }

        let requeued = Self::requeue(job, &place_ids);
        let message = format!("Force-retrying {} failed salons", requeued);
        job_log(&mut job.snapshot, LogLevel::Warn, message);

        let job = inner.job.take().ok_or(JobError::NothingToRetry)?;
        self.spawn_run(&mut inner, job)
    }

    /// Move failed entries back to the front of the remaining queue, with
    /// their retry count incremented.
    fn requeue(job: &mut PersistedJob, place_ids: &[String]) -> usize {
        let mut entries: Vec<QueueEntry> = Vec::with_capacity(place_ids.len());
        for place_id in place_ids {
            if entries.iter().any(|e| &e.place_id == place_id) {
                continue;
            }
            if let Some(failed) = job.snapshot.remove_failed(place_id) {
                let mut entry = failed.to_queue_entry();
                entry.retries += 1;
                entries.push(entry);
            }
        }

        let count = entries.len();
        job.snapshot.failed = job.snapshot.failed.saturating_sub(count);
        for entry in &entries {
            job.snapshot.completed_cities.remove(&entry.city_key());
        }
        let cursor = job.cursor.min(job.queue.len());
        job.queue.splice(cursor..cursor, entries);
        count
    }

    /// Discard a paused or completed job and return to idle.
    pub async fn reset(&self) -> Result<Arc<ProgressSnapshot>, JobError> {
        let mut inner = self.inner.lock().await;
        if inner.state == JobState::Running {
            return Err(JobError::AlreadyRunning);
        }

        self.job_store.clear()?;
        if let Some(job) = inner.job.take() {
            info!("Reset enrichment job {}", job.job_id);
        }
        inner.state = JobState::Idle;
        self.progress
            .publish(ProgressSnapshot::idle(self.settings.log_capacity));
        Ok(self.progress.get())
    }

    /// Reload the persisted job. A job that was running when the process
    /// stopped comes back paused, and is resumed if configured to.
    pub async fn recover_on_startup(self: &Arc<Self>) -> anyhow::Result<()> {
        let Some(mut job) = self.job_store.load_current()? else {
            debug!("No persisted enrichment job");
            return Ok(());
        };

        job.snapshot.logs.set_capacity(self.settings.log_capacity);
        let interrupted = job.state == JobState::Running;
        if interrupted {
            job.state = JobState::Paused;
            job.snapshot.pause_reason = Some("Interrupted by a restart".to_string());
            let message = format!(
                "Job {} was interrupted at {}/{}",
                job.job_id,
                job.cursor,
                job.queue.len()
            );
            job_log(&mut job.snapshot, LogLevel::Warn, message);
        }
        job.snapshot.state = job.state;
        job.snapshot.is_running = false;
        job.snapshot.cursor = job.cursor;
        job.snapshot.queue_length = job.queue.len();
        self.refresh_estimates(&mut job.snapshot, None);

        self.job_store
            .save_progress(&job.job_id, job.state, job.cursor, &job.snapshot)?;
        self.progress.publish(job.snapshot.clone());

        {
            let mut inner = self.inner.lock().await;
            inner.state = job.state;
            inner.job = Some(job);
        }

        if interrupted && self.settings.resume_on_startup {
            self.resume()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to resume interrupted job: {}", e))?;
        }
        Ok(())
    }

    /// Stop the loop for process shutdown, keeping the job resumable.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Err(JobError::NotRunning) = self.pause().await {
            debug!("No enrichment job to stop");
        }
    }

    // =========================================================================
    // Processing loop
    // =========================================================================

    async fn run_loop(self: Arc<Self>, mut job: PersistedJob, cancel: CancellationToken) {
        let mut breaker = PersistenceBreaker::new(self.settings.persistence_failure_threshold);
        let mut durations = DurationAverage::new(self.settings.duration_window);

        let exit = loop {
            if job.cursor >= job.queue.len() {
                break LoopExit::Completed;
            }
            if cancel.is_cancelled() {
                break LoopExit::Paused;
            }

            let mut entry = job.queue[job.cursor].clone();
            job.snapshot.current_salon = Some(entry.place_id.clone());
            job.snapshot.current_city = Some(entry.city_key());
            self.progress.publish(job.snapshot.clone());

            let started = Instant::now();
            let (item, charges) = self
                .process_item(&mut entry, job.force_refresh, &cancel)
                .await;
            job.queue[job.cursor].retries = entry.retries;
            job.snapshot.costs.charge(&charges);
            record_costs(&charges);

            let result = match item {
                ItemResult::Done(result) => result,
                ItemResult::Interrupted => {
                    debug!("Paused while {} was waiting to be retried", entry.place_id);
                    break LoopExit::Paused;
                }
            };

            let mut persistence_failed = false;
            let skipped = match result {
                Ok(EnrichOutcome::SkippedFresh) => {
                    job.snapshot.skipped += 1;
                    metrics::record_item("skipped");
                    debug!("Skipped fresh salon {}", entry.place_id);
                    true
                }
                Ok(EnrichOutcome::Enriched { .. }) => {
                    job.snapshot.enriched += 1;
                    durations.record(started.elapsed().as_secs_f64());
                    metrics::record_item("enriched");
                    job_log(
                        &mut job.snapshot,
                        LogLevel::Info,
                        format!(
                            "Enriched {} ({}, {}) for ${:.3}",
                            entry.name,
                            entry.city,
                            entry.state,
                            charges.total()
                        ),
                    );
                    false
                }
                Err(e) => {
                    persistence_failed = e.kind() == FailureKind::Persistence;
                    durations.record(started.elapsed().as_secs_f64());
                    self.record_failure(&mut job.snapshot, &entry, &e);
                    false
                }
            };

            job.cursor += 1;
            job.snapshot.cursor = job.cursor;
            if !job.queue[job.cursor..]
                .iter()
                .any(|q| q.state == entry.state && q.city == entry.city)
            {
                job.snapshot.completed_cities.insert(entry.city_key());
            }
            self.refresh_estimates(&mut job.snapshot, Some(&durations));
            if !self.persist_progress(&job, JobState::Running) {
                persistence_failed = true;
            }
            self.progress.publish(job.snapshot.clone());

            if breaker.record(persistence_failed) == BreakerAction::Trip {
                break LoopExit::BreakerTripped(format!(
                    "Paused after {} consecutive persistence failures",
                    self.settings.persistence_failure_threshold
                ));
            }

            if !skipped && job.cursor < job.queue.len() {
                tokio::select! {
                    _ = tokio::time::sleep(self.inter_item_delay()) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        };

        self.finish_run(job, exit).await;
    }

    /// Enrich one salon, retrying transient failures in-line with backoff.
    ///
    /// Details fetched by a failed attempt are reused by the next one, so a
    /// retry after a generation failure does not pay for the lookup again.
    async fn process_item(
        &self,
        entry: &mut QueueEntry,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> (ItemResult, Charges) {
        let mut total = Charges::default();
        let mut held = None;
        loop {
            let attempt = self
                .worker
                .enrich_with(&entry.place_id, force_refresh, held.take())
                .await;
            total.places += attempt.charges.places;
            total.generative += attempt.charges.generative;
            held = attempt.details;

            match attempt.result {
                Err(e) if self.policy.should_auto_retry(e.kind(), entry.retries) => {
                    let backoff = self.policy.backoff(entry.retries);
                    entry.retries += 1;
                    warn!(
                        "{} failed with {}, retry {}/{} in {:?}",
                        entry.place_id, e, entry.retries, self.policy.max_retries, backoff
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return (ItemResult::Interrupted, total),
                    }
                }
                result => return (ItemResult::Done(result), total),
            }
        }
    }

    fn record_failure(&self, snapshot: &mut ProgressSnapshot, entry: &QueueEntry, e: &EnrichError) {
        let kind = e.kind();
        snapshot.failed += 1;
        snapshot.upsert_failed(FailedSalon {
            place_id: entry.place_id.clone(),
            name: entry.name.clone(),
            state: entry.state.clone(),
            city: entry.city.clone(),
            error: e.to_string(),
            kind,
            retries: entry.retries,
            failed_at: chrono::Utc::now().timestamp(),
        });
        metrics::record_item("failed");

        if kind != FailureKind::Persistence {
            if let Err(store_err) = self.worker.store().mark_failed(&entry.place_id) {
                warn!("Failed to mark {} as failed: {:#}", entry.place_id, store_err);
            }
        }
        job_log(
            snapshot,
            LogLevel::Warn,
            format!(
                "Failed {} ({}, {}): {} [{} retries]",
                entry.name, entry.city, entry.state, e, entry.retries
            ),
        );
    }

    /// Save the cursor and snapshot. Returns false if the write failed.
    fn persist_progress(&self, job: &PersistedJob, state: JobState) -> bool {
        match self
            .job_store
            .save_progress(&job.job_id, state, job.cursor, &job.snapshot)
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist progress of job {}: {:#}", job.job_id, e);
                false
            }
        }
    }

    /// Hand the job back to the manager once the loop stopped.
    async fn finish_run(&self, mut job: PersistedJob, exit: LoopExit) {
        let mut inner = self.inner.lock().await;

        let state = match exit {
            LoopExit::Completed => {
                let message = format!(
                    "Job {} completed: {} enriched, {} failed, {} skipped, ${:.2} spent",
                    job.job_id,
                    job.snapshot.enriched,
                    job.snapshot.failed,
                    job.snapshot.skipped,
                    job.snapshot.costs.total
                );
                job_log(&mut job.snapshot, LogLevel::Info, message);
                JobState::Completed
            }
            LoopExit::Paused => {
                let message = format!("Job {} paused at {}/{}", job.job_id, job.cursor, job.queue.len());
                job_log(&mut job.snapshot, LogLevel::Info, message);
                JobState::Paused
            }
            LoopExit::BreakerTripped(reason) => {
                job_log(&mut job.snapshot, LogLevel::Error, reason.clone());
                job.snapshot.pause_reason = Some(reason);
                JobState::Paused
            }
        };

        job.state = state;
        job.snapshot.state = state;
        job.snapshot.is_running = false;
        job.snapshot.current_salon = None;
        job.snapshot.current_city = None;
        self.refresh_estimates(&mut job.snapshot, None);
        if state == JobState::Completed {
            job.snapshot.estimated_time_remaining_secs = Some(0);
        }

        // Stopped by shutdown: leave it marked running so the next start
        // recovers it as interrupted.
        let persisted_state = if self.shutting_down.load(Ordering::SeqCst) {
            JobState::Running
        } else {
            state
        };
        self.persist_progress(&job, persisted_state);
        self.progress.publish(job.snapshot.clone());
        metrics::set_job_running(false);

        inner.state = state;
        inner.job = Some(job);
        inner.running = None;
    }
}

fn record_costs(charges: &Charges) {
    if charges.places > 0.0 {
        metrics::record_cost("places", charges.places);
    }
    if charges.generative > 0.0 {
        metrics::record_cost("generative", charges.generative);
    }
}
