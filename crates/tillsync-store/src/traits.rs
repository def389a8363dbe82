//! Store trait: the abstract interface for durable local state.
//!
//! One collection per entity type holds [`StoredRecord`]s keyed by entity id,
//! one collection holds [`QueueItem`]s keyed by item id, and a small table
//! holds the last successful pull time per reference kind.
//!
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tillsync_core::{EntityType, QueueItem, QueueItemId, ReferenceKind, SyncStatus, VersionedRecord};

use crate::error::Result;

/// A record as persisted: entity data kept as JSON.
pub type StoredRecord = VersionedRecord<Value>;

/// Queue item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl QueueStats {
    /// Build stats from per-status counts; `total` is always their sum.
    pub fn from_counts(pending: usize, in_progress: usize, completed: usize, failed: usize) -> Self {
        Self {
            pending,
            in_progress,
            completed,
            failed,
            total: pending + in_progress + completed + failed,
        }
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        match status {
            SyncStatus::Pending => self.pending,
            SyncStatus::InProgress => self.in_progress,
            SyncStatus::Completed => self.completed,
            SyncStatus::Failed => self.failed,
        }
    }
}

/// The Store trait: async interface for durable local state.
///
/// Every write is durable before the returned future resolves. Failures are
/// reported, never retried inside the store.
///
/// # Design Notes
///
/// - **Atomic per call**: each method is atomic on its own; callers need no
///   external locking.
/// - **No integrity policy**: records come back exactly as stored. Checksum
///   verification happens in [`LocalStore`](crate::LocalStore).
/// - **Declared indexes only**: [`Store::get_records_by_index`] rejects index
///   names the entity type does not declare.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by entity id.
    async fn get_record(&self, entity: EntityType, id: &str) -> Result<Option<StoredRecord>>;

    /// Insert or replace a record.
    async fn put_record(&self, entity: EntityType, record: &StoredRecord) -> Result<()>;

    /// Delete a record. Returns whether it existed.
    async fn delete_record(&self, entity: EntityType, id: &str) -> Result<bool>;

    /// All records of an entity type, ordered by id.
    async fn get_all_records(&self, entity: EntityType) -> Result<Vec<StoredRecord>>;

    /// Records whose index field equals `value`, ordered by id.
    ///
    /// `index` is either [`SYNC_STATUS_INDEX`](tillsync_core::SYNC_STATUS_INDEX)
    /// or one of [`EntityType::indexed_fields`].
    async fn get_records_by_index(
        &self,
        entity: EntityType,
        index: &str,
        value: &Value,
    ) -> Result<Vec<StoredRecord>>;

    /// Atomically replace the whole collection with `records`.
    async fn replace_records(&self, entity: EntityType, records: &[StoredRecord]) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queue Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new queue item. Fails if the id is already present.
    async fn insert_queue_item(&self, item: &QueueItem) -> Result<()>;

    /// Overwrite an existing queue item. Fails if the id is unknown.
    async fn update_queue_item(&self, item: &QueueItem) -> Result<()>;

    /// Get a queue item by id.
    async fn get_queue_item(&self, id: &QueueItemId) -> Result<Option<QueueItem>>;

    /// Delete a queue item. Returns whether it existed.
    async fn delete_queue_item(&self, id: &QueueItemId) -> Result<bool>;

    /// Queue items, optionally filtered by status, in processing order.
    ///
    /// Processing order is priority descending, retry count ascending,
    /// creation time ascending.
    async fn get_queue_items(&self, status: Option<SyncStatus>) -> Result<Vec<QueueItem>>;

    /// Queue items for one entity type, in processing order.
    async fn get_queue_items_by_entity(&self, entity: EntityType) -> Result<Vec<QueueItem>>;

    /// Count queue items per status.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Delete every queue item with the given status. Returns the count.
    async fn delete_queue_items_by_status(&self, status: SyncStatus) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Freshness Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Last successful pull of a reference kind (Unix ms).
    async fn get_last_fetch(&self, kind: ReferenceKind) -> Result<Option<i64>>;

    /// Record a successful pull.
    async fn set_last_fetch(&self, kind: ReferenceKind, at: i64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_total_is_sum() {
        let stats = QueueStats::from_counts(3, 1, 7, 2);
        assert_eq!(stats.total, 13);
        assert_eq!(stats.count(SyncStatus::Completed), 7);
    }
}
