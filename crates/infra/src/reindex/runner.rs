//! The reindex job runner.
//!
//! Turns one reindex job plus one row-source subscription into one published
//! event per row, eventually-persisted progress and a correct terminal
//! status. The runner is tenant-scoped; its collaborators (repository,
//! publisher, row-source factory) are injected so test doubles can stand in
//! without process-wide state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use recordstore_core::TenantId;
use recordstore_events::{EventMessage, EventPublisher};

use super::job::{ReindexJob, ReindexJobId, ReindexJobStatus};
use super::repository::{ReindexJobRepository, RepositoryError};
use super::row_stream::{Row, RowHandler, RowSource, RowSourceFactory, RowStreamError};

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum publishes in flight (not yet acknowledged) before the row
    /// source is paused.
    pub inflight_limit: usize,
    /// Persist progress every this many published rows.
    pub progress_cadence: u64,
    /// Tolerated publish failures; exceeding this fails the job.
    pub failure_budget: u64,
    /// How long to wait for in-flight publishes to settle at end-of-stream.
    pub drain_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            inflight_limit: 100,
            progress_cadence: 1000,
            failure_budget: 100,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl RunnerConfig {
    pub fn with_inflight_limit(mut self, limit: usize) -> Self {
        self.inflight_limit = limit.max(1);
        self
    }

    pub fn with_progress_cadence(mut self, rows: u64) -> Self {
        self.progress_cadence = rows.max(1);
        self
    }

    pub fn with_failure_budget(mut self, budget: u64) -> Self {
        self.failure_budget = budget;
        self
    }
}

/// Reindex orchestration error (precondition failures, collaborator errors).
#[derive(Debug, thiserror::Error)]
pub enum ReindexError {
    #[error("job {0} is not in progress")]
    NotInProgress(ReindexJobId),
    #[error("job {0} is already running")]
    AlreadyRunning(ReindexJobId),
    #[error("job not found: {0}")]
    NotFound(ReindexJobId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Source(#[from] RowStreamError),
}

/// Cancellation flag shared between the runner's control plane and the
/// worker consuming the subscription.
#[derive(Debug, Default)]
struct JobControl {
    cancelled: AtomicBool,
}

type ActiveJobs = Arc<Mutex<HashMap<ReindexJobId, Arc<JobControl>>>>;

/// Orchestrates reindex jobs for one tenant.
///
/// `start_reindex` and `cancel_reindex_job` both return immediately; all real
/// work happens on the row source's producer thread and the publisher's
/// completion context.
pub struct ReindexJobRunner<R: ReindexJobRepository + 'static> {
    tenant_id: TenantId,
    repository: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    sources: Arc<dyn RowSourceFactory>,
    config: RunnerConfig,
    active: ActiveJobs,
}

impl<R: ReindexJobRepository + 'static> ReindexJobRunner<R> {
    pub fn new(
        tenant_id: TenantId,
        repository: Arc<R>,
        publisher: Arc<dyn EventPublisher>,
        sources: Arc<dyn RowSourceFactory>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            tenant_id,
            repository,
            publisher,
            sources,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start republishing every record as a `REINDEX` event.
    ///
    /// Preconditions: the job is `IN_PROGRESS` and no other run owns its id.
    /// Returns as soon as the subscription is open; progress and the terminal
    /// status surface through the repository.
    pub fn start_reindex(&self, job: &ReindexJob) -> Result<(), ReindexError> {
        if job.job_status != ReindexJobStatus::InProgress {
            return Err(ReindexError::NotInProgress(job.id));
        }
        if let Some(stored) = self.repository.get(job.id)? {
            if stored.is_terminal() {
                return Err(ReindexError::NotInProgress(job.id));
            }
        }

        let control = Arc::new(JobControl::default());
        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(&job.id) {
                return Err(ReindexError::AlreadyRunning(job.id));
            }
            active.insert(job.id, control.clone());
        }

        let source = match self.sources.open(self.tenant_id) {
            Ok(source) => source,
            Err(e) => {
                self.active.lock().unwrap().remove(&job.id);
                return Err(e.into());
            }
        };

        info!(job_id = %job.id, tenant_id = %self.tenant_id, "starting reindex job");

        let worker = ReindexWorker {
            job: job.clone(),
            tenant_id: self.tenant_id,
            repository: self.repository.clone(),
            publisher: self.publisher.clone(),
            source: source.clone(),
            control,
            window: Arc::new(PublishWindow::new(self.config.inflight_limit)),
            config: self.config.clone(),
            active: self.active.clone(),
            finished: false,
        };

        source.subscribe(Box::new(worker));
        Ok(())
    }

    /// Request cancellation of a running job.
    ///
    /// Cooperative: the flag is observed at the next row boundary. Cancelling
    /// a job already in a terminal state has no effect.
    pub fn cancel_reindex_job(&self, id: ReindexJobId) -> Result<(), ReindexError> {
        if let Some(control) = self.active.lock().unwrap().get(&id).cloned() {
            control.cancelled.store(true, Ordering::SeqCst);
            info!(job_id = %id, "reindex cancellation requested");
            return Ok(());
        }

        // Not active here: a no-op for known (terminal) jobs.
        match self.repository.get(id)? {
            Some(_) => Ok(()),
            None => Err(ReindexError::NotFound(id)),
        }
    }

    /// Read the current persisted job record.
    pub fn get_reindex_job(&self, id: ReindexJobId) -> Result<ReindexJob, ReindexError> {
        self.repository.get(id)?.ok_or(ReindexError::NotFound(id))
    }
}

/// Bounded window of unacknowledged publishes.
///
/// `acquire` and `complete` serialize on the inner mutex, so the pause/resume
/// calls they make on the row source are ordered and fire exactly once per
/// threshold crossing.
struct PublishWindow {
    limit: usize,
    inflight: Mutex<usize>,
    drained: Condvar,
    paused: AtomicBool,
    failures: AtomicU64,
}

impl PublishWindow {
    fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            inflight: Mutex::new(0),
            drained: Condvar::new(),
            paused: AtomicBool::new(false),
            failures: AtomicU64::new(0),
        }
    }

    /// Register one submitted publish, pausing the source at the threshold.
    fn acquire(&self, source: &dyn RowSource) {
        let mut inflight = self.inflight.lock().unwrap();
        *inflight += 1;
        if *inflight >= self.limit && !self.paused.swap(true, Ordering::SeqCst) {
            source.pause();
        }
    }

    /// Register one acknowledged publish, resuming the source once below the
    /// threshold.
    fn complete(&self, source: &dyn RowSource, failed: bool) {
        if failed {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        let mut inflight = self.inflight.lock().unwrap();
        *inflight = inflight.saturating_sub(1);
        if *inflight < self.limit && self.paused.swap(false, Ordering::SeqCst) {
            source.resume();
        }
        self.drained.notify_all();
    }

    /// Wait until every submitted publish has been acknowledged.
    fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inflight = self.inflight.lock().unwrap();
        while *inflight > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.drained.wait_timeout(inflight, deadline - now).unwrap();
            inflight = guard;
        }
        true
    }

    fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Per-job worker driven by the row source's producer thread.
///
/// `on_row`/`on_end`/`on_error` are serialized by the source, so `job` and
/// `finished` have a single writer; the publish window mediates with the
/// publisher's completion context.
struct ReindexWorker<R: ReindexJobRepository> {
    job: ReindexJob,
    tenant_id: TenantId,
    repository: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    source: Arc<dyn RowSource>,
    control: Arc<JobControl>,
    window: Arc<PublishWindow>,
    config: RunnerConfig,
    active: ActiveJobs,
    finished: bool,
}

impl<R: ReindexJobRepository> ReindexWorker<R> {
    fn finish(&mut self, status: ReindexJobStatus) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.source.close();
        self.job.job_status = status;

        // The terminal write is at-least-once: a write lost here leaves the
        // job IN_PROGRESS in the repository while this run has stopped.
        if let Err(e) = self.repository.update(&self.job) {
            warn!(job_id = %self.job.id, error = %e, "terminal status write failed, retrying once");
            if let Err(e) = self.repository.update(&self.job) {
                error!(job_id = %self.job.id, error = %e, "terminal status write lost");
            }
        }

        self.active.lock().unwrap().remove(&self.job.id);

        info!(
            job_id = %self.job.id,
            status = ?self.job.job_status,
            published = self.job.published,
            "reindex job finished"
        );
    }

    fn persist_progress(&self) {
        if let Err(e) = self.repository.update(&self.job) {
            warn!(
                job_id = %self.job.id,
                error = %e,
                "progress write failed, retrying on next cadence"
            );
        }
    }
}

impl<R: ReindexJobRepository + 'static> RowHandler for ReindexWorker<R> {
    fn on_row(&mut self, row: Row) {
        if self.finished {
            // Deliveries already dispatched when the stream closed.
            return;
        }
        if self.control.cancelled.load(Ordering::SeqCst) {
            self.finish(ReindexJobStatus::Cancelled);
            return;
        }
        if self.window.failures() > self.config.failure_budget {
            error!(
                job_id = %self.job.id,
                failures = self.window.failures(),
                "publish failure budget exhausted"
            );
            self.finish(ReindexJobStatus::Failed);
            return;
        }

        let message = EventMessage::for_reindex(row.id, self.tenant_id, self.job.id);

        self.window.acquire(self.source.as_ref());

        let window = self.window.clone();
        let source = self.source.clone();
        let job_id = self.job.id;
        self.publisher.publish(
            message,
            Box::new(move |result| {
                if let Err(e) = &result {
                    debug!(job_id = %job_id, error = %e, "publish failed");
                }
                window.complete(source.as_ref(), result.is_err());
            }),
        );

        self.job.published += 1;
        if self.job.published % self.config.progress_cadence == 0 {
            self.persist_progress();
        }
    }

    fn on_end(&mut self) {
        if self.finished {
            return;
        }

        if !self.window.drain(self.config.drain_timeout) {
            warn!(job_id = %self.job.id, "timed out draining in-flight publishes");
        }

        let status = if self.window.failures() > self.config.failure_budget {
            ReindexJobStatus::Failed
        } else {
            ReindexJobStatus::Completed
        };
        self.finish(status);
    }

    fn on_error(&mut self, error: RowStreamError) {
        if self.finished {
            return;
        }
        error!(job_id = %self.job.id, error = %error, "row source failed");
        self.finish(ReindexJobStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use recordstore_core::RecordId;
    use recordstore_events::InMemoryEventPublisher;

    use crate::reindex::repository::InMemoryReindexJobRepository;
    use crate::reindex::row_stream::testing::{SyntheticRowFetch, wait_until};
    use crate::reindex::row_stream::{FetchRowStream, FnRowSourceFactory, VecRowFetch};

    use super::*;

    fn runner_over_ids(
        ids: Vec<RecordId>,
        publisher: Arc<InMemoryEventPublisher>,
        config: RunnerConfig,
    ) -> ReindexJobRunner<Arc<InMemoryReindexJobRepository>> {
        let sources = FnRowSourceFactory::arc(move |_tenant| {
            Ok(FetchRowStream::arc(VecRowFetch::new(ids.clone())))
        });
        ReindexJobRunner::new(
            TenantId::new(),
            Arc::new(InMemoryReindexJobRepository::arc()),
            publisher,
            sources,
            config,
        )
    }

    fn submit(runner: &ReindexJobRunner<Arc<InMemoryReindexJobRepository>>) -> ReindexJob {
        let job = ReindexJob::new();
        runner.repository.save(&job).unwrap();
        runner.start_reindex(&job).unwrap();
        job
    }

    fn await_terminal(
        runner: &ReindexJobRunner<Arc<InMemoryReindexJobRepository>>,
        id: ReindexJobId,
    ) -> ReindexJob {
        assert!(
            wait_until(Duration::from_secs(10), || {
                runner
                    .get_reindex_job(id)
                    .map(|j| j.is_terminal())
                    .unwrap_or(false)
            }),
            "job did not reach a terminal status"
        );
        runner.get_reindex_job(id).unwrap()
    }

    #[test]
    fn publishes_every_row_and_completes() {
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let ids: Vec<_> = (0..250).map(|_| RecordId::new()).collect();
        let runner = runner_over_ids(ids.clone(), publisher.clone(), RunnerConfig::default());

        let job = submit(&runner);
        let finished = await_terminal(&runner, job.id);

        assert_eq!(finished.job_status, ReindexJobStatus::Completed);
        assert_eq!(finished.published, 250);
        assert!(wait_until(Duration::from_secs(1), || {
            publisher.messages().len() == 250
        }));
    }

    #[test]
    fn rejects_job_not_in_progress() {
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let runner = runner_over_ids(Vec::new(), publisher, RunnerConfig::default());

        let mut job = ReindexJob::new();
        job.job_status = ReindexJobStatus::Completed;

        assert!(matches!(
            runner.start_reindex(&job),
            Err(ReindexError::NotInProgress(_))
        ));
    }

    #[test]
    fn rejects_restart_of_terminal_job() {
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let runner = runner_over_ids(
            (0..10).map(|_| RecordId::new()).collect(),
            publisher,
            RunnerConfig::default(),
        );

        let job = submit(&runner);
        let finished = await_terminal(&runner, job.id);
        assert_eq!(finished.job_status, ReindexJobStatus::Completed);

        // The caller still holds the stale IN_PROGRESS record.
        assert!(matches!(
            runner.start_reindex(&job),
            Err(ReindexError::NotInProgress(_))
        ));
        assert_eq!(runner.get_reindex_job(job.id).unwrap().published, 10);
    }

    #[test]
    fn rejects_concurrent_start_of_same_job() {
        let publisher = Arc::new(InMemoryEventPublisher::with_latency(Duration::from_millis(2)));
        let config = RunnerConfig::default().with_inflight_limit(2);
        let runner = runner_over_ids(
            (0..500).map(|_| RecordId::new()).collect(),
            publisher,
            config,
        );

        let job = submit(&runner);
        assert!(matches!(
            runner.start_reindex(&job),
            Err(ReindexError::AlreadyRunning(_))
        ));

        runner.cancel_reindex_job(job.id).unwrap();
        await_terminal(&runner, job.id);
    }

    #[test]
    fn failure_budget_exhaustion_fails_the_job() {
        // Every publish fails; the budget trips quickly.
        let publisher = Arc::new(InMemoryEventPublisher::failing_every(1));
        let config = RunnerConfig::default().with_failure_budget(5);
        let runner = runner_over_ids(
            (0..100_000).map(|_| RecordId::new()).collect(),
            publisher,
            config,
        );

        let job = submit(&runner);
        let finished = await_terminal(&runner, job.id);

        assert_eq!(finished.job_status, ReindexJobStatus::Failed);
    }

    #[test]
    fn cancel_of_unknown_job_is_an_error() {
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let runner = runner_over_ids(Vec::new(), publisher, RunnerConfig::default());

        assert!(matches!(
            runner.cancel_reindex_job(ReindexJobId::new()),
            Err(ReindexError::NotFound(_))
        ));
    }

    #[test]
    fn cancel_after_terminal_is_idempotent() {
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let runner = runner_over_ids(
            (0..20).map(|_| RecordId::new()).collect(),
            publisher,
            RunnerConfig::default(),
        );

        let job = submit(&runner);
        let finished = await_terminal(&runner, job.id);
        assert_eq!(finished.job_status, ReindexJobStatus::Completed);

        runner.cancel_reindex_job(job.id).unwrap();
        runner.cancel_reindex_job(job.id).unwrap();

        let after = runner.get_reindex_job(job.id).unwrap();
        assert_eq!(after, finished);
    }

    #[test]
    fn source_open_failure_leaves_job_startable() {
        let publisher = Arc::new(InMemoryEventPublisher::new());
        let sources = FnRowSourceFactory::arc(|_tenant| {
            Err(RowStreamError::Storage("no connection".to_string()))
        });
        let runner: ReindexJobRunner<Arc<InMemoryReindexJobRepository>> = ReindexJobRunner::new(
            TenantId::new(),
            Arc::new(InMemoryReindexJobRepository::arc()),
            publisher,
            sources,
            RunnerConfig::default(),
        );

        let job = ReindexJob::new();
        runner.repository.save(&job).unwrap();

        assert!(matches!(
            runner.start_reindex(&job),
            Err(ReindexError::Source(_))
        ));
        // The id is released again.
        assert!(runner.active.lock().unwrap().is_empty());
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 24,
                ..ProptestConfig::default()
            })]

            /// Property: a run that is neither cancelled nor failed publishes
            /// exactly one event per row and completes.
            #[test]
            fn published_count_equals_total_rows(total in 0u64..400) {
                let publisher = Arc::new(InMemoryEventPublisher::new());
                let sources = FnRowSourceFactory::arc(move |_tenant| {
                    Ok(FetchRowStream::arc(SyntheticRowFetch::new(total)))
                });
                let runner: ReindexJobRunner<Arc<InMemoryReindexJobRepository>> =
                    ReindexJobRunner::new(
                        TenantId::new(),
                        Arc::new(InMemoryReindexJobRepository::arc()),
                        publisher,
                        sources,
                        RunnerConfig::default().with_inflight_limit(8),
                    );

                let job = ReindexJob::new();
                runner.repository.save(&job).unwrap();
                runner.start_reindex(&job).unwrap();

                let reached_terminal = wait_until(Duration::from_secs(10), || {
                    runner
                        .get_reindex_job(job.id)
                        .map(|j| j.is_terminal())
                        .unwrap_or(false)
                });
                prop_assert!(reached_terminal);

                let finished = runner.get_reindex_job(job.id).unwrap();
                prop_assert_eq!(finished.job_status, ReindexJobStatus::Completed);
                prop_assert_eq!(finished.published, total);
            }
        }
    }
}
