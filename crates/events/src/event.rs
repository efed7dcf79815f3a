//! Domain event payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use recordstore_core::TenantId;

/// Discriminator for the kind of change an event describes.
///
/// `Reindex` marks events republished by a reindex job, distinguishing them
/// from the create/update/delete events emitted on normal writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEventType {
    Create,
    Update,
    Delete,
    DeleteAll,
    Reindex,
}

/// A domain event payload.
///
/// Events are immutable facts. `old`/`new` carry record snapshots where the
/// change kind has them; reindex events carry neither (consumers re-read the
/// record by key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    event_type: DomainEventType,
    tenant: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new: Option<Value>,
}

impl DomainEvent {
    pub fn created(new: Value, tenant: TenantId) -> Self {
        Self {
            event_type: DomainEventType::Create,
            tenant,
            old: None,
            new: Some(new),
        }
    }

    pub fn updated(old: Value, new: Value, tenant: TenantId) -> Self {
        Self {
            event_type: DomainEventType::Update,
            tenant,
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn deleted(old: Value, tenant: TenantId) -> Self {
        Self {
            event_type: DomainEventType::Delete,
            tenant,
            old: Some(old),
            new: None,
        }
    }

    pub fn all_deleted(tenant: TenantId) -> Self {
        Self {
            event_type: DomainEventType::DeleteAll,
            tenant,
            old: None,
            new: None,
        }
    }

    pub fn reindexed(tenant: TenantId) -> Self {
        Self {
            event_type: DomainEventType::Reindex,
            tenant,
            old: None,
            new: None,
        }
    }

    pub fn event_type(&self) -> DomainEventType {
        self.event_type
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn old(&self) -> Option<&Value> {
        self.old.as_ref()
    }

    pub fn new_value(&self) -> Option<&Value> {
        self.new.as_ref()
    }
}
