//! Reindex job storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::job::{ReindexJob, ReindexJobId};

/// Durable store for reindex job records.
///
/// The repository is the sole durable source of truth for a job: the runner is
/// the only writer for a given job id, any number of observers may read.
pub trait ReindexJobRepository: Send + Sync {
    /// Get a job by ID.
    fn get(&self, id: ReindexJobId) -> Result<Option<ReindexJob>, RepositoryError>;

    /// Insert a newly submitted job.
    fn save(&self, job: &ReindexJob) -> Result<(), RepositoryError>;

    /// Overwrite an existing job (progress/status persistence).
    fn update(&self, job: &ReindexJob) -> Result<(), RepositoryError>;
}

/// Job repository error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("job not found: {0}")]
    NotFound(ReindexJobId),
    #[error("job already exists: {0}")]
    AlreadyExists(ReindexJobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl<R> ReindexJobRepository for Arc<R>
where
    R: ReindexJobRepository + ?Sized,
{
    fn get(&self, id: ReindexJobId) -> Result<Option<ReindexJob>, RepositoryError> {
        (**self).get(id)
    }

    fn save(&self, job: &ReindexJob) -> Result<(), RepositoryError> {
        (**self).save(job)
    }

    fn update(&self, job: &ReindexJob) -> Result<(), RepositoryError> {
        (**self).update(job)
    }
}

/// In-memory job repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReindexJobRepository {
    jobs: RwLock<HashMap<ReindexJobId, ReindexJob>>,
}

impl InMemoryReindexJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ReindexJobRepository for InMemoryReindexJobRepository {
    fn get(&self, id: ReindexJobId) -> Result<Option<ReindexJob>, RepositoryError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.get(&id).cloned())
    }

    fn save(&self, job: &ReindexJob) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(RepositoryError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn update(&self, job: &ReindexJob) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(RepositoryError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::reindex::job::ReindexJobStatus;

    use super::*;

    #[test]
    fn save_get_update_round_trip() {
        let repo = InMemoryReindexJobRepository::new();
        let mut job = ReindexJob::new();

        repo.save(&job).unwrap();
        assert_eq!(repo.get(job.id).unwrap().unwrap(), job);

        job.published = 42;
        job.job_status = ReindexJobStatus::Completed;
        repo.update(&job).unwrap();

        let stored = repo.get(job.id).unwrap().unwrap();
        assert_eq!(stored.published, 42);
        assert_eq!(stored.job_status, ReindexJobStatus::Completed);
    }

    #[test]
    fn save_rejects_duplicate_id() {
        let repo = InMemoryReindexJobRepository::new();
        let job = ReindexJob::new();

        repo.save(&job).unwrap();
        assert!(matches!(
            repo.save(&job),
            Err(RepositoryError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_requires_existing_job() {
        let repo = InMemoryReindexJobRepository::new();
        let job = ReindexJob::new();

        assert!(matches!(
            repo.update(&job),
            Err(RepositoryError::NotFound(_))
        ));
    }
}
