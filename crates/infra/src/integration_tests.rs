//! End-to-end reindex runner scenarios over in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use recordstore_core::{RecordId, TenantId};
use recordstore_events::{
    DomainEventType, InMemoryEventPublisher, REINDEX_JOB_ID_HEADER,
};

use crate::records::{InMemoryRecordStore, Record, RecordStore};
use crate::reindex::row_stream::testing::{FailingRowFetch, SyntheticRowFetch, wait_until};
use crate::reindex::{
    FetchRowStream, FnRowSourceFactory, InMemoryReindexJobRepository, ReindexJob,
    ReindexJobRepository, ReindexJobRunner, ReindexJobStatus, RowSourceFactory, RunnerConfig,
    VecRowFetch,
};

type TestRunner = ReindexJobRunner<Arc<InMemoryReindexJobRepository>>;

struct Harness {
    tenant: TenantId,
    repository: Arc<InMemoryReindexJobRepository>,
    publisher: Arc<InMemoryEventPublisher>,
    runner: TestRunner,
}

impl Harness {
    fn new(
        publisher: InMemoryEventPublisher,
        config: RunnerConfig,
        sources: Arc<dyn RowSourceFactory>,
    ) -> Self {
        let tenant = TenantId::new();
        let repository = InMemoryReindexJobRepository::arc();
        let publisher = Arc::new(publisher);

        let runner = ReindexJobRunner::new(
            tenant,
            Arc::new(repository.clone()),
            publisher.clone(),
            sources,
            config,
        );

        Self {
            tenant,
            repository,
            publisher,
            runner,
        }
    }

    fn submit(&self) -> ReindexJob {
        let job = ReindexJob::new();
        self.repository.save(&job).unwrap();
        self.runner.start_reindex(&job).unwrap();
        job
    }

    fn await_status(&self, job: &ReindexJob, status: ReindexJobStatus) -> ReindexJob {
        assert!(
            wait_until(Duration::from_secs(30), || {
                self.repository
                    .get(job.id)
                    .unwrap()
                    .map(|j| j.job_status == status)
                    .unwrap_or(false)
            }),
            "job never reached {status:?}"
        );
        self.repository.get(job.id).unwrap().unwrap()
    }
}

#[test]
fn reindexes_a_whole_table() {
    let ids: Vec<_> = (0..2000).map(|_| RecordId::new()).collect();
    let first_id = ids[0];

    let harness = Harness::new(
        InMemoryEventPublisher::new(),
        RunnerConfig::default(),
        FnRowSourceFactory::arc(move |_tenant| {
            Ok(FetchRowStream::arc(VecRowFetch::new(ids.clone())))
        }),
    );

    let job = harness.submit();
    let finished = harness.await_status(&job, ReindexJobStatus::Completed);

    assert_eq!(finished.published, 2000);
    assert_eq!(finished.submitted_date, job.submitted_date);

    assert!(wait_until(Duration::from_secs(5), || {
        !harness
            .publisher
            .messages_for_key(&first_id.to_string())
            .is_empty()
    }));

    let event = harness
        .publisher
        .messages_for_key(&first_id.to_string())
        .pop()
        .unwrap();
    assert_eq!(event.payload().event_type(), DomainEventType::Reindex);
    assert_eq!(event.payload().tenant(), harness.tenant);
    assert_eq!(
        event.header(REINDEX_JOB_ID_HEADER),
        Some(job.id.to_string().as_str())
    );
}

#[test]
fn cancels_a_reindex_mid_stream() {
    let harness = Harness::new(
        InMemoryEventPublisher::with_latency(Duration::from_micros(200)),
        RunnerConfig::default(),
        FnRowSourceFactory::arc(|_tenant| {
            Ok(FetchRowStream::arc(SyntheticRowFetch::new(10_000_000)))
        }),
    );

    let job = harness.submit();

    // Let the job make visible progress before cancelling.
    assert!(wait_until(Duration::from_secs(30), || {
        harness
            .repository
            .get(job.id)
            .unwrap()
            .map(|j| j.published >= 1000)
            .unwrap_or(false)
    }));

    harness.runner.cancel_reindex_job(job.id).unwrap();
    let finished = harness.await_status(&job, ReindexJobStatus::Cancelled);

    assert!(finished.published >= 1000);
    assert!(finished.published < 10_000_000);
}

#[test]
fn source_error_fails_the_job_and_keeps_the_count() {
    let harness = Harness::new(
        InMemoryEventPublisher::new(),
        RunnerConfig::default(),
        FnRowSourceFactory::arc(|_tenant| {
            Ok(FetchRowStream::arc(FailingRowFetch::new(
                SyntheticRowFetch::new(100_000),
                50,
            )))
        }),
    );

    let job = harness.submit();
    let finished = harness.await_status(&job, ReindexJobStatus::Failed);

    assert_eq!(finished.published, 50);
}

#[test]
fn outstanding_publishes_never_exceed_the_inflight_limit() {
    let harness = Harness::new(
        InMemoryEventPublisher::with_latency(Duration::from_millis(2)),
        RunnerConfig::default().with_inflight_limit(8),
        FnRowSourceFactory::arc(|_tenant| {
            Ok(FetchRowStream::arc(SyntheticRowFetch::new(200)))
        }),
    );

    let job = harness.submit();
    let finished = harness.await_status(&job, ReindexJobStatus::Completed);

    assert_eq!(finished.published, 200);
    assert!(
        harness.publisher.max_inflight() <= 8,
        "observed {} outstanding publishes",
        harness.publisher.max_inflight()
    );
}

#[test]
fn events_are_submitted_in_row_order() {
    let ids: Vec<_> = (0..300).map(|_| RecordId::new()).collect();
    let expected: Vec<_> = ids.iter().map(|id| id.to_string()).collect();

    let harness = Harness::new(
        InMemoryEventPublisher::new(),
        RunnerConfig::default().with_inflight_limit(4),
        FnRowSourceFactory::arc(move |_tenant| {
            Ok(FetchRowStream::arc(VecRowFetch::new(ids.clone())))
        }),
    );

    let job = harness.submit();
    harness.await_status(&job, ReindexJobStatus::Completed);

    assert!(wait_until(Duration::from_secs(5), || {
        harness.publisher.messages().len() == 300
    }));

    let seen: Vec<_> = harness
        .publisher
        .messages()
        .iter()
        .map(|m| m.key().to_string())
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn reindex_covers_every_stored_record() {
    let store = InMemoryRecordStore::arc();
    let tenant = TenantId::new();

    for i in 0..25 {
        store
            .create(
                tenant,
                &Record::new(RecordId::new(), serde_json::json!({ "n": i })),
            )
            .unwrap();
    }

    // Same wiring the service uses for the in-memory store: snapshot the
    // tenant's ids when the job opens its source.
    let source_store = store.clone();
    let repository = InMemoryReindexJobRepository::arc();
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let runner: TestRunner = ReindexJobRunner::new(
        tenant,
        Arc::new(repository.clone()),
        publisher.clone(),
        FnRowSourceFactory::arc(move |t: TenantId| {
            Ok(FetchRowStream::arc(VecRowFetch::new(
                source_store.record_ids(t),
            )))
        }),
        RunnerConfig::default(),
    );

    let job = ReindexJob::new();
    repository.save(&job).unwrap();
    runner.start_reindex(&job).unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        repository
            .get(job.id)
            .unwrap()
            .map(|j| j.job_status == ReindexJobStatus::Completed)
            .unwrap_or(false)
    }));

    assert_eq!(repository.get(job.id).unwrap().unwrap().published, 25);
    assert!(wait_until(Duration::from_secs(5), || {
        publisher.messages().len() == 25
    }));

    let mut expected: Vec<_> = store
        .record_ids(tenant)
        .iter()
        .map(|id| id.to_string())
        .collect();
    expected.sort();
    let mut seen: Vec<_> = publisher
        .messages()
        .iter()
        .map(|m| m.key().to_string())
        .collect();
    seen.sort();
    assert_eq!(seen, expected);
}
