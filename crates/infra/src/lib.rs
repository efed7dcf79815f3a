//! Infrastructure layer: record storage, the reindex core, publisher transports.

pub mod publisher;
pub mod records;
pub mod reindex;

#[cfg(test)]
mod integration_tests;
