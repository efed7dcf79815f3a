//! Record store abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use recordstore_core::{RecordId, TenantId};

/// One stored record: an identifier plus an opaque JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub data: Value,
}

impl Record {
    pub fn new(id: RecordId, data: Value) -> Self {
        Self { id, data }
    }
}

/// Record store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordStoreError {
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Tenant-isolated record storage.
///
/// Every operation is keyed by tenant; cross-tenant access is impossible by
/// construction.
pub trait RecordStore: Send + Sync {
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<Record>, RecordStoreError>;

    fn create(&self, tenant_id: TenantId, record: &Record) -> Result<(), RecordStoreError>;

    /// Overwrite an existing record, returning the previous body.
    fn update(&self, tenant_id: TenantId, record: &Record) -> Result<Record, RecordStoreError>;

    /// Remove a record, returning it for the outbound delete event.
    fn delete(&self, tenant_id: TenantId, id: RecordId) -> Result<Record, RecordStoreError>;
}

impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<Record>, RecordStoreError> {
        (**self).get(tenant_id, id)
    }

    fn create(&self, tenant_id: TenantId, record: &Record) -> Result<(), RecordStoreError> {
        (**self).create(tenant_id, record)
    }

    fn update(&self, tenant_id: TenantId, record: &Record) -> Result<Record, RecordStoreError> {
        (**self).update(tenant_id, record)
    }

    fn delete(&self, tenant_id: TenantId, id: RecordId) -> Result<Record, RecordStoreError> {
        (**self).delete(tenant_id, id)
    }
}

/// In-memory record store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<(TenantId, RecordId), Value>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of a tenant's record ids in ascending order.
    ///
    /// Feeds the in-memory row source; the Postgres path streams ids in
    /// batches instead of snapshotting.
    pub fn record_ids(&self, tenant_id: TenantId) -> Vec<RecordId> {
        let records = self.records.read().unwrap();
        let mut ids: Vec<_> = records
            .keys()
            .filter(|(t, _)| *t == tenant_id)
            .map(|(_, id)| *id)
            .collect();
        ids.sort();
        ids
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, tenant_id: TenantId, id: RecordId) -> Result<Option<Record>, RecordStoreError> {
        let records = self.records.read().unwrap();
        Ok(records
            .get(&(tenant_id, id))
            .map(|data| Record::new(id, data.clone())))
    }

    fn create(&self, tenant_id: TenantId, record: &Record) -> Result<(), RecordStoreError> {
        let mut records = self.records.write().unwrap();
        let key = (tenant_id, record.id);
        if records.contains_key(&key) {
            return Err(RecordStoreError::AlreadyExists(record.id));
        }
        records.insert(key, record.data.clone());
        Ok(())
    }

    fn update(&self, tenant_id: TenantId, record: &Record) -> Result<Record, RecordStoreError> {
        let mut records = self.records.write().unwrap();
        let key = (tenant_id, record.id);
        match records.insert(key, record.data.clone()) {
            Some(old) => Ok(Record::new(record.id, old)),
            None => {
                records.remove(&key);
                Err(RecordStoreError::NotFound(record.id))
            }
        }
    }

    fn delete(&self, tenant_id: TenantId, id: RecordId) -> Result<Record, RecordStoreError> {
        let mut records = self.records.write().unwrap();
        match records.remove(&(tenant_id, id)) {
            Some(old) => Ok(Record::new(id, old)),
            None => Err(RecordStoreError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: &str) -> Record {
        Record::new(RecordId::new(), serde_json::json!({ "title": body }))
    }

    #[test]
    fn create_get_update_delete_round_trip() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new();
        let mut rec = record("first");

        store.create(tenant, &rec).unwrap();
        assert_eq!(store.get(tenant, rec.id).unwrap().unwrap(), rec);

        rec.data = serde_json::json!({ "title": "second" });
        let old = store.update(tenant, &rec).unwrap();
        assert_eq!(old.data["title"], "first");

        let deleted = store.delete(tenant, rec.id).unwrap();
        assert_eq!(deleted.data["title"], "second");
        assert!(store.get(tenant, rec.id).unwrap().is_none());
    }

    #[test]
    fn create_rejects_duplicates() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new();
        let rec = record("x");

        store.create(tenant, &rec).unwrap();
        assert!(matches!(
            store.create(tenant, &rec),
            Err(RecordStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn tenants_are_isolated() {
        let store = InMemoryRecordStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let rec = record("x");

        store.create(tenant_a, &rec).unwrap();

        assert!(store.get(tenant_b, rec.id).unwrap().is_none());
        assert!(store.record_ids(tenant_b).is_empty());
        assert_eq!(store.record_ids(tenant_a), vec![rec.id]);
    }

    #[test]
    fn record_ids_are_sorted() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new();

        for _ in 0..20 {
            store.create(tenant, &record("x")).unwrap();
        }

        let ids = store.record_ids(tenant);
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 20);
    }
}
