//! Service wiring: storage, event publisher and the reindex runner.
//!
//! Runs either fully in memory (dev/tests) or against Postgres when
//! `DATABASE_URL` is set. Domain events go to Redis Streams when the
//! `redis` feature is enabled and `REDIS_URL` is set.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Handle;
use tracing::{error, warn};

use recordstore_core::{RecordId, TenantId};
use recordstore_events::{DomainEvent, EventMessage, EventPublisher, InMemoryEventPublisher};
use recordstore_infra::records::{
    InMemoryRecordStore, PostgresRecordStore, PostgresRowSourceFactory, Record, RecordStore,
    RecordStoreError,
};
use recordstore_infra::reindex::{
    FetchRowStream, FnRowSourceFactory, InMemoryReindexJobRepository, PostgresReindexJobRepository,
    ReindexError, ReindexJob, ReindexJobId, ReindexJobRepository, ReindexJobRunner,
    RepositoryError, RowSourceFactory, RunnerConfig, VecRowFetch,
};

#[cfg(feature = "redis")]
use recordstore_infra::publisher::RedisStreamsPublisher;

type ServiceRunner = ReindexJobRunner<Arc<dyn ReindexJobRepository>>;

/// Shared application services behind the HTTP handlers.
///
/// Runners are created lazily per tenant; each one owns the active-job
/// bookkeeping for that tenant's reindex jobs.
pub struct AppServices {
    records: Arc<dyn RecordStore>,
    repository: Arc<dyn ReindexJobRepository>,
    publisher: Arc<dyn EventPublisher>,
    sources: Arc<dyn RowSourceFactory>,
    runner_config: RunnerConfig,
    runners: Mutex<HashMap<TenantId, Arc<ServiceRunner>>>,
}

/// Wire services from the environment.
pub async fn build_services() -> AppServices {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(8)
                .connect(&url)
                .await
                .expect("failed to connect to postgres");
            AppServices::postgres(pool, Handle::current())
        }
        Err(_) => {
            warn!("DATABASE_URL not set; records and jobs stay in memory");
            AppServices::in_memory()
        }
    }
}

#[cfg(feature = "redis")]
fn build_publisher() -> Arc<dyn EventPublisher> {
    match std::env::var("REDIS_URL") {
        Ok(url) => Arc::new(
            RedisStreamsPublisher::new(url, std::env::var("EVENT_STREAM_KEY").ok())
                .expect("failed to connect redis streams publisher"),
        ),
        Err(_) => {
            warn!("REDIS_URL not set; events stay in memory");
            Arc::new(InMemoryEventPublisher::new())
        }
    }
}

#[cfg(not(feature = "redis"))]
fn build_publisher() -> Arc<dyn EventPublisher> {
    Arc::new(InMemoryEventPublisher::new())
}

impl AppServices {
    pub fn in_memory() -> Self {
        let records = InMemoryRecordStore::arc();

        // The in-memory source snapshots the tenant's ids when a job opens
        // its subscription.
        let store = records.clone();
        let sources = FnRowSourceFactory::arc(move |tenant_id| {
            Ok(FetchRowStream::arc(VecRowFetch::new(
                store.record_ids(tenant_id),
            )))
        });

        Self {
            records,
            repository: InMemoryReindexJobRepository::arc(),
            publisher: build_publisher(),
            sources,
            runner_config: RunnerConfig::default(),
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn postgres(pool: PgPool, runtime: Handle) -> Self {
        Self {
            records: Arc::new(PostgresRecordStore::new(pool.clone(), runtime.clone())),
            repository: Arc::new(PostgresReindexJobRepository::new(
                pool.clone(),
                runtime.clone(),
            )),
            publisher: build_publisher(),
            sources: Arc::new(PostgresRowSourceFactory::new(pool, runtime)),
            runner_config: RunnerConfig::default(),
            runners: Mutex::new(HashMap::new()),
        }
    }

    fn runner(&self, tenant_id: TenantId) -> Arc<ServiceRunner> {
        let mut runners = self.runners.lock().unwrap();
        runners
            .entry(tenant_id)
            .or_insert_with(|| {
                Arc::new(ReindexJobRunner::new(
                    tenant_id,
                    Arc::new(self.repository.clone()),
                    self.publisher.clone(),
                    self.sources.clone(),
                    self.runner_config.clone(),
                ))
            })
            .clone()
    }

    // Record CRUD. Each write publishes the matching domain event after the
    // store accepted it; publish failures are logged, not surfaced, so the
    // write itself stays durable.

    pub fn get_record(
        &self,
        tenant_id: TenantId,
        id: RecordId,
    ) -> Result<Option<Record>, RecordStoreError> {
        self.records.get(tenant_id, id)
    }

    pub fn create_record(
        &self,
        tenant_id: TenantId,
        record: Record,
    ) -> Result<Record, RecordStoreError> {
        self.records.create(tenant_id, &record)?;
        self.publish(EventMessage::new(
            record.id.to_string(),
            DomainEvent::created(record.data.clone(), tenant_id),
            tenant_id,
        ));
        Ok(record)
    }

    pub fn update_record(
        &self,
        tenant_id: TenantId,
        record: Record,
    ) -> Result<Record, RecordStoreError> {
        let old = self.records.update(tenant_id, &record)?;
        self.publish(EventMessage::new(
            record.id.to_string(),
            DomainEvent::updated(old.data, record.data.clone(), tenant_id),
            tenant_id,
        ));
        Ok(record)
    }

    pub fn delete_record(
        &self,
        tenant_id: TenantId,
        id: RecordId,
    ) -> Result<Record, RecordStoreError> {
        let old = self.records.delete(tenant_id, id)?;
        self.publish(EventMessage::new(
            id.to_string(),
            DomainEvent::deleted(old.data.clone(), tenant_id),
            tenant_id,
        ));
        Ok(old)
    }

    fn publish(&self, message: EventMessage) {
        let key = message.key().to_string();
        self.publisher.publish(
            message,
            Box::new(move |result| {
                if let Err(e) = result {
                    error!(key = %key, error = %e, "domain event publish failed");
                }
            }),
        );
    }

    // Reindex jobs.

    /// Persist a fresh job and start streaming the tenant's records.
    pub fn submit_reindex(&self, tenant_id: TenantId) -> Result<ReindexJob, ReindexError> {
        let job = ReindexJob::new();
        self.repository.save(&job)?;
        self.runner(tenant_id).start_reindex(&job)?;
        Ok(job)
    }

    pub fn get_reindex_job(&self, id: ReindexJobId) -> Result<Option<ReindexJob>, RepositoryError> {
        self.repository.get(id)
    }

    pub fn cancel_reindex_job(
        &self,
        tenant_id: TenantId,
        id: ReindexJobId,
    ) -> Result<(), ReindexError> {
        self.runner(tenant_id).cancel_reindex_job(id)
    }
}
