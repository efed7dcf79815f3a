//! Keyed outbound messages.

use std::collections::HashMap;

use recordstore_core::{RecordId, TenantId};

use crate::event::DomainEvent;

/// Header carrying the reindex job that republished a record.
pub const REINDEX_JOB_ID_HEADER: &str = "reindex-job-id";

/// Header carrying the originating tenant.
///
/// Has to be lowercase; consumers treat header names case-sensitively.
pub const TENANT_HEADER: &str = "x-tenant";

/// One outbound message: partition key, domain-event payload, headers.
///
/// Immutable once built; ownership transfers to the publisher. The key is the
/// record id, so a partitioned bus preserves per-record ordering across a
/// reindex job and unrelated writes to the same record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    key: String,
    payload: DomainEvent,
    headers: HashMap<String, String>,
}

impl EventMessage {
    pub fn new(key: impl Into<String>, payload: DomainEvent, tenant_id: TenantId) -> Self {
        let mut headers = HashMap::new();
        headers.insert(TENANT_HEADER.to_string(), tenant_id.to_string());

        Self {
            key: key.into(),
            payload,
            headers,
        }
    }

    /// Build the message republishing one record for a reindex job.
    pub fn for_reindex(record_id: RecordId, tenant_id: TenantId, job_id: impl ToString) -> Self {
        Self::new(record_id.to_string(), DomainEvent::reindexed(tenant_id), tenant_id)
            .with_header(REINDEX_JOB_ID_HEADER, job_id.to_string())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &DomainEvent {
        &self.payload
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DomainEventType;

    #[test]
    fn reindex_message_is_keyed_by_record_and_carries_job_header() {
        let tenant = TenantId::new();
        let record = RecordId::new();
        let job_id = uuid::Uuid::now_v7();

        let msg = EventMessage::for_reindex(record, tenant, job_id);

        assert_eq!(msg.key(), record.to_string());
        assert_eq!(msg.payload().event_type(), DomainEventType::Reindex);
        assert_eq!(msg.header(REINDEX_JOB_ID_HEADER), Some(job_id.to_string().as_str()));
        assert_eq!(msg.header(TENANT_HEADER), Some(tenant.to_string().as_str()));
    }
}
