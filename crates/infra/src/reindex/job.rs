//! The reindex job record and its status state machine.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recordstore_core::DomainError;

/// Unique reindex job identifier, assigned by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReindexJobId(pub Uuid);

impl ReindexJobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ReindexJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReindexJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReindexJobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("ReindexJobId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Job execution status.
///
/// `InProgress` is the only non-terminal state. Transitions happen exclusively
/// through the runner owning the job:
/// `IN_PROGRESS -> COMPLETED | CANCELLED | FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReindexJobStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl ReindexJobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReindexJobStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexJobStatus::InProgress => "IN_PROGRESS",
            ReindexJobStatus::Completed => "COMPLETED",
            ReindexJobStatus::Cancelled => "CANCELLED",
            ReindexJobStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ReindexJobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(ReindexJobStatus::InProgress),
            "COMPLETED" => Ok(ReindexJobStatus::Completed),
            "CANCELLED" => Ok(ReindexJobStatus::Cancelled),
            "FAILED" => Ok(ReindexJobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// A reindex job.
///
/// `published` is mutated only by the runner owning the job (single writer);
/// any number of observers may read it through the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexJob {
    /// Unique job ID, immutable after submission.
    pub id: ReindexJobId,
    /// Current status.
    pub job_status: ReindexJobStatus,
    /// Number of records republished so far (monotonically non-decreasing).
    pub published: u64,
    /// When the job was submitted, immutable.
    pub submitted_date: DateTime<Utc>,
}

impl ReindexJob {
    /// Create a new job in `IN_PROGRESS` with a fresh id.
    pub fn new() -> Self {
        Self::with_id(ReindexJobId::new())
    }

    pub fn with_id(id: ReindexJobId) -> Self {
        Self {
            id,
            job_status: ReindexJobStatus::InProgress,
            published: 0,
            submitted_date: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.job_status.is_terminal()
    }
}

impl Default for ReindexJob {
    fn default() -> Self {
        Self::new()
    }
}
