//! Postgres-backed reindex job repository.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE reindex_job (
//!   id             uuid PRIMARY KEY,
//!   job_status     text NOT NULL,
//!   published      bigint NOT NULL,
//!   submitted_date timestamptz NOT NULL
//! );
//! ```

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use uuid::Uuid;

use super::job::{ReindexJob, ReindexJobId, ReindexJobStatus};
use super::repository::{ReindexJobRepository, RepositoryError};

/// Job repository over a Postgres pool.
///
/// The runner calls this from plain threads, so the async driver is bridged
/// through an explicitly injected runtime handle rather than an ambient one.
pub struct PostgresReindexJobRepository {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresReindexJobRepository {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    fn map_row(row: &sqlx::postgres::PgRow) -> Result<ReindexJob, RepositoryError> {
        let id: Uuid = row
            .try_get("id")
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let status: String = row
            .try_get("job_status")
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let published: i64 = row
            .try_get("published")
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;
        let submitted_date: DateTime<Utc> = row
            .try_get("submitted_date")
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        let job_status: ReindexJobStatus = status
            .parse()
            .map_err(|e| RepositoryError::Storage(format!("{e}")))?;

        Ok(ReindexJob {
            id: ReindexJobId::from_uuid(id),
            job_status,
            published: published.max(0) as u64,
            submitted_date,
        })
    }
}

impl ReindexJobRepository for PostgresReindexJobRepository {
    fn get(&self, id: ReindexJobId) -> Result<Option<ReindexJob>, RepositoryError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query(
                    "SELECT id, job_status, published, submitted_date \
                     FROM reindex_job WHERE id = $1",
                )
                .bind(id.0)
                .fetch_optional(&self.pool),
            )
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        row.as_ref().map(Self::map_row).transpose()
    }

    fn save(&self, job: &ReindexJob) -> Result<(), RepositoryError> {
        let result = self.runtime.block_on(
            sqlx::query(
                "INSERT INTO reindex_job (id, job_status, published, submitted_date) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(job.id.0)
            .bind(job.job_status.as_str())
            .bind(job.published as i64)
            .bind(job.submitted_date)
            .execute(&self.pool),
        );

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(RepositoryError::AlreadyExists(job.id))
            }
            Err(e) => Err(RepositoryError::Storage(e.to_string())),
        }
    }

    fn update(&self, job: &ReindexJob) -> Result<(), RepositoryError> {
        let result = self
            .runtime
            .block_on(
                sqlx::query(
                    "UPDATE reindex_job SET job_status = $2, published = $3 WHERE id = $1",
                )
                .bind(job.id.0)
                .bind(job.job_status.as_str())
                .bind(job.published as i64)
                .execute(&self.pool),
            )
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(job.id));
        }
        Ok(())
    }
}
