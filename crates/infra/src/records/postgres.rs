//! Postgres-backed record store and row streaming.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE record (
//!   tenant_id uuid NOT NULL,
//!   id        uuid NOT NULL,
//!   data      jsonb NOT NULL,
//!   PRIMARY KEY (tenant_id, id)
//! );
//! ```

use std::collections::VecDeque;

use serde_json::Value;
use sqlx::{PgPool, Row as SqlxRow};
use tokio::runtime::Handle;
use uuid::Uuid;

use recordstore_core::{RecordId, TenantId};

use crate::reindex::row_stream::{
    FetchRowStream, Row, RowFetch, RowSource, RowSourceFactory, RowStreamError,
};

use super::store::{Record, RecordStore, RecordStoreError};

/// Record store over a Postgres pool.
pub struct PostgresRecordStore {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }
}

impl RecordStore for PostgresRecordStore {
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<Record>, RecordStoreError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query("SELECT data FROM record WHERE tenant_id = $1 AND id = $2")
                    .bind(*tenant_id.as_uuid())
                    .bind(*id.as_uuid())
                    .fetch_optional(&self.pool),
            )
            .map_err(|e| RecordStoreError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| RecordStoreError::Storage(e.to_string()))?;
                Ok(Some(Record::new(id, data)))
            }
            None => Ok(None),
        }
    }

    fn create(&self, tenant_id: TenantId, record: &Record) -> Result<(), RecordStoreError> {
        let result = self.runtime.block_on(
            sqlx::query("INSERT INTO record (tenant_id, id, data) VALUES ($1, $2, $3)")
                .bind(*tenant_id.as_uuid())
                .bind(*record.id.as_uuid())
                .bind(&record.data)
                .execute(&self.pool),
        );

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(RecordStoreError::AlreadyExists(record.id))
            }
            Err(e) => Err(RecordStoreError::Storage(e.to_string())),
        }
    }

    fn update(&self, tenant_id: TenantId, record: &Record) -> Result<Record, RecordStoreError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query(
                    "UPDATE record r SET data = $3 \
                     FROM (SELECT data FROM record WHERE tenant_id = $1 AND id = $2) old \
                     WHERE r.tenant_id = $1 AND r.id = $2 \
                     RETURNING old.data AS old_data",
                )
                .bind(*tenant_id.as_uuid())
                .bind(*record.id.as_uuid())
                .bind(&record.data)
                .fetch_optional(&self.pool),
            )
            .map_err(|e| RecordStoreError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let old: Value = row
                    .try_get("old_data")
                    .map_err(|e| RecordStoreError::Storage(e.to_string()))?;
                Ok(Record::new(record.id, old))
            }
            None => Err(RecordStoreError::NotFound(record.id)),
        }
    }

    fn delete(&self, tenant_id: TenantId, id: RecordId) -> Result<Record, RecordStoreError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query(
                    "DELETE FROM record WHERE tenant_id = $1 AND id = $2 RETURNING data",
                )
                .bind(*tenant_id.as_uuid())
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool),
            )
            .map_err(|e| RecordStoreError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| RecordStoreError::Storage(e.to_string()))?;
                Ok(Record::new(id, data))
            }
            None => Err(RecordStoreError::NotFound(id)),
        }
    }
}

/// Streams a tenant's record ids with batched keyset reads.
///
/// Memory stays bounded by the batch size regardless of table size; the
/// cursor makes the scan restart-free across batches.
pub struct PostgresRowFetch {
    pool: PgPool,
    runtime: Handle,
    tenant_id: TenantId,
    batch: VecDeque<RecordId>,
    cursor: Option<Uuid>,
    batch_size: i64,
    exhausted: bool,
}

impl PostgresRowFetch {
    const DEFAULT_BATCH_SIZE: i64 = 1000;

    pub fn new(pool: PgPool, runtime: Handle, tenant_id: TenantId) -> Self {
        Self {
            pool,
            runtime,
            tenant_id,
            batch: VecDeque::new(),
            cursor: None,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            exhausted: false,
        }
    }

    fn refill(&mut self) -> Result<(), RowStreamError> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query(
                    "SELECT id FROM record \
                     WHERE tenant_id = $1 AND ($2::uuid IS NULL OR id > $2) \
                     ORDER BY id LIMIT $3",
                )
                .bind(*self.tenant_id.as_uuid())
                .bind(self.cursor)
                .bind(self.batch_size)
                .fetch_all(&self.pool),
            )
            .map_err(|e| RowStreamError::Storage(e.to_string()))?;

        if (rows.len() as i64) < self.batch_size {
            self.exhausted = true;
        }

        for row in rows {
            let id: Uuid = row
                .try_get("id")
                .map_err(|e| RowStreamError::Storage(e.to_string()))?;
            self.cursor = Some(id);
            self.batch.push_back(RecordId::from_uuid(id));
        }
        Ok(())
    }
}

impl RowFetch for PostgresRowFetch {
    fn next_row(&mut self) -> Result<Option<Row>, RowStreamError> {
        if self.batch.is_empty() && !self.exhausted {
            self.refill()?;
        }
        Ok(self.batch.pop_front().map(Row::new))
    }
}

/// Opens Postgres-backed row sources, one per reindex job.
pub struct PostgresRowSourceFactory {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresRowSourceFactory {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }
}

impl RowSourceFactory for PostgresRowSourceFactory {
    fn open(&self, tenant_id: TenantId) -> Result<std::sync::Arc<dyn RowSource>, RowStreamError> {
        Ok(FetchRowStream::arc(PostgresRowFetch::new(
            self.pool.clone(),
            self.runtime.clone(),
            tenant_id,
        )))
    }
}
