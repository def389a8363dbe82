//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use tillsync_core::{
    processing_order, EntityType, QueueItem, QueueItemId, ReferenceKind, SyncStatus,
    SYNC_STATUS_INDEX,
};

use crate::error::{Result, StoreError};
use crate::traits::{QueueStats, Store, StoredRecord};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records per entity type, keyed (and therefore ordered) by id.
    records: HashMap<EntityType, BTreeMap<String, StoredRecord>>,

    /// Queue items by id.
    queue: HashMap<QueueItemId, QueueItem>,

    /// Last successful pull per reference kind.
    freshness: HashMap<ReferenceKind, i64>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Same matching rules as the SQLite `json_extract` lookup: a null value
/// matches absent fields, booleans match their 0/1 encoding.
fn index_matches(record: &StoredRecord, index: &str, value: &Value) -> Result<bool> {
    if index == SYNC_STATUS_INDEX {
        return Ok(value.as_str() == Some(record.sync_status.as_str()));
    }

    let field = record.field(index);
    match value {
        Value::Null => Ok(matches!(field, None | Some(Value::Null))),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidData(
            "index lookups take scalar values".into(),
        )),
        Value::Bool(b) => Ok(match field {
            Some(Value::Bool(f)) => f == b,
            Some(Value::Number(n)) => n.as_i64() == Some(*b as i64),
            _ => false,
        }),
        Value::Number(n) => Ok(match field {
            Some(Value::Number(f)) => f.as_f64() == n.as_f64(),
            Some(Value::Bool(f)) => n.as_i64() == Some(*f as i64),
            _ => false,
        }),
        Value::String(_) => Ok(field == Some(value)),
    }
}

fn sorted(mut items: Vec<QueueItem>) -> Vec<QueueItem> {
    items.sort_by(processing_order);
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_record(&self, entity: EntityType, id: &str) -> Result<Option<StoredRecord>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .get(&entity)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn put_record(&self, entity: EntityType, record: &StoredRecord) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .records
            .entry(entity)
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, entity: EntityType, id: &str) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner
            .records
            .get_mut(&entity)
            .and_then(|records| records.remove(id))
            .is_some())
    }

    async fn get_all_records(&self, entity: EntityType) -> Result<Vec<StoredRecord>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .get(&entity)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_records_by_index(
        &self,
        entity: EntityType,
        index: &str,
        value: &Value,
    ) -> Result<Vec<StoredRecord>> {
        if !entity.has_index(index) {
            return Err(StoreError::UnknownIndex {
                entity,
                index: index.to_string(),
            });
        }

        let inner = self.read()?;
        let mut found = Vec::new();
        if let Some(records) = inner.records.get(&entity) {
            for record in records.values() {
                if index_matches(record, index, value)? {
                    found.push(record.clone());
                }
            }
        }
        Ok(found)
    }

    async fn replace_records(&self, entity: EntityType, records: &[StoredRecord]) -> Result<()> {
        let fresh: BTreeMap<String, StoredRecord> = records
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();

        let mut inner = self.write()?;
        inner.records.insert(entity, fresh);
        Ok(())
    }

    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()> {
        let mut inner = self.write()?;
        if inner.queue.contains_key(&item.id) {
            return Err(StoreError::AlreadyExists(item.id.to_string()));
        }
        inner.queue.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn update_queue_item(&self, item: &QueueItem) -> Result<()> {
        let mut inner = self.write()?;
        match inner.queue.get_mut(&item.id) {
            Some(slot) => {
                *slot = item.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(item.id.to_string())),
        }
    }

    async fn get_queue_item(&self, id: &QueueItemId) -> Result<Option<QueueItem>> {
        let inner = self.read()?;
        Ok(inner.queue.get(id).cloned())
    }

    async fn delete_queue_item(&self, id: &QueueItemId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.queue.remove(id).is_some())
    }

    async fn get_queue_items(&self, status: Option<SyncStatus>) -> Result<Vec<QueueItem>> {
        let inner = self.read()?;
        let items = inner
            .queue
            .values()
            .filter(|item| status.map_or(true, |s| item.status == s))
            .cloned()
            .collect();
        Ok(sorted(items))
    }

    async fn get_queue_items_by_entity(&self, entity: EntityType) -> Result<Vec<QueueItem>> {
        let inner = self.read()?;
        let items = inner
            .queue
            .values()
            .filter(|item| item.entity_type == entity)
            .cloned()
            .collect();
        Ok(sorted(items))
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let inner = self.read()?;
        let count = |status: SyncStatus| inner.queue.values().filter(|i| i.status == status).count();
        Ok(QueueStats::from_counts(
            count(SyncStatus::Pending),
            count(SyncStatus::InProgress),
            count(SyncStatus::Completed),
            count(SyncStatus::Failed),
        ))
    }

    async fn delete_queue_items_by_status(&self, status: SyncStatus) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.queue.len();
        inner.queue.retain(|_, item| item.status != status);
        Ok(before - inner.queue.len())
    }

    async fn get_last_fetch(&self, kind: ReferenceKind) -> Result<Option<i64>> {
        let inner = self.read()?;
        Ok(inner.freshness.get(&kind).copied())
    }

    async fn set_last_fetch(&self, kind: ReferenceKind, at: i64) -> Result<()> {
        let mut inner = self.write()?;
        inner.freshness.insert(kind, at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tillsync_core::{wrap_with_version, OperationType, Priority};

    fn contact(id: &str, email: Option<&str>) -> StoredRecord {
        let mut data = json!({"id": id, "name": "Ada", "contactType": "CUSTOMER"});
        if let Some(email) = email {
            data["email"] = json!(email);
        }
        wrap_with_version(data, id, None).unwrap()
    }

    #[tokio::test]
    async fn test_records_ordered_by_id() {
        let store = MemoryStore::new();
        for id in ["c3", "c1", "c2"] {
            store.put_record(EntityType::Contact, &contact(id, None)).await.unwrap();
        }

        let all = store.get_all_records(EntityType::Contact).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert!(store.get_all_records(EntityType::Sale).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_lookup() {
        let store = MemoryStore::new();
        store
            .put_record(EntityType::Contact, &contact("c1", Some("a@b.c")))
            .await
            .unwrap();
        store.put_record(EntityType::Contact, &contact("c2", None)).await.unwrap();

        let by_email = store
            .get_records_by_index(EntityType::Contact, "email", &json!("a@b.c"))
            .await
            .unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].id, "c1");

        let without = store
            .get_records_by_index(EntityType::Contact, "email", &Value::Null)
            .await
            .unwrap();
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].id, "c2");

        let none = store
            .get_records_by_index(EntityType::Contact, "email", &json!("nobody@x"))
            .await
            .unwrap();
        assert!(none.is_empty());

        assert!(matches!(
            store
                .get_records_by_index(EntityType::Contact, "sku", &json!("x"))
                .await,
            Err(StoreError::UnknownIndex { .. })
        ));
    }

    #[tokio::test]
    async fn test_queue_processing_order() {
        let store = MemoryStore::new();
        let mut setting = QueueItem::new(
            EntityType::BusinessSetting,
            OperationType::Update,
            json!({"id": "s"}),
            Priority::Low,
        );
        setting.created_at = 0;
        let mut sale = QueueItem::new(
            EntityType::Sale,
            OperationType::Create,
            json!({"id": "x"}),
            Priority::High,
        );
        sale.created_at = 10;

        store.insert_queue_item(&setting).await.unwrap();
        store.insert_queue_item(&sale).await.unwrap();

        let items = store.get_queue_items(None).await.unwrap();
        assert_eq!(items[0].id, sale.id);
        assert_eq!(items[1].id, setting.id);

        let sales = store
            .get_queue_items_by_entity(EntityType::Sale)
            .await
            .unwrap();
        assert_eq!(sales.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_status() {
        let store = MemoryStore::new();
        let mut done = QueueItem::new(EntityType::Sale, OperationType::Create, json!({}), Priority::High);
        done.mark_completed();
        let pending = QueueItem::new(EntityType::Sale, OperationType::Create, json!({}), Priority::High);

        store.insert_queue_item(&done).await.unwrap();
        store.insert_queue_item(&pending).await.unwrap();

        assert_eq!(
            store.delete_queue_items_by_status(SyncStatus::Completed).await.unwrap(),
            1
        );
        assert_eq!(store.queue_stats().await.unwrap(), QueueStats::from_counts(1, 0, 0, 0));
    }
}
