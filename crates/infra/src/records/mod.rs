//! Record storage: the table the reindex runner streams back out.

pub mod postgres;
pub mod store;

pub use postgres::{PostgresRecordStore, PostgresRowFetch, PostgresRowSourceFactory};
pub use store::{InMemoryRecordStore, Record, RecordStore, RecordStoreError};
