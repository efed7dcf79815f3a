//! Reindexing: stream every stored record back out as a domain event.
//!
//! The pieces, leaf-first:
//! - [`row_stream`] — pull/push hybrid streaming of record ids with
//!   pause/resume flow control
//! - [`job`] / [`repository`] — the durable job record and its store
//! - [`runner`] — the orchestrator: backpressure, progress persistence,
//!   cooperative cancellation, terminal status

pub mod job;
pub mod postgres;
pub mod repository;
pub mod row_stream;
pub mod runner;

pub use job::{ReindexJob, ReindexJobId, ReindexJobStatus};
pub use postgres::PostgresReindexJobRepository;
pub use repository::{InMemoryReindexJobRepository, ReindexJobRepository, RepositoryError};
pub use row_stream::{
    FetchRowStream, FnRowSourceFactory, Row, RowFetch, RowHandler, RowSource, RowSourceFactory,
    RowStreamError, VecRowFetch,
};
pub use runner::{ReindexError, ReindexJobRunner, RunnerConfig};
