//! LocalStore: typed, integrity-checked access to versioned records.
//!
//! Wraps any [`Store`] backend. Every record read through this type has its
//! checksum verified; a mismatch is reported as [`StoreError::Integrity`] and
//! the record is never handed out. Every write goes through the backend
//! before the call returns, so callers can enqueue sync work only after the
//! local data is durable.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tillsync_core::{
    verify_integrity, wrap_with_version, Checksum, EntityType, SyncStatus, VersionedRecord,
};

use crate::error::{Result, StoreError};
use crate::traits::{Store, StoredRecord};

/// Typed facade over a [`Store`] backend.
pub struct LocalStore<S> {
    store: Arc<S>,
}

impl<S> Clone for LocalStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> LocalStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<S> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a verified record, decoded into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        entity: EntityType,
        id: &str,
    ) -> Result<Option<VersionedRecord<T>>> {
        match self.get_value(entity, id).await? {
            Some(record) => Ok(Some(record.decode()?)),
            None => Ok(None),
        }
    }

    /// Get a verified record with its data left as JSON.
    pub async fn get_value(&self, entity: EntityType, id: &str) -> Result<Option<StoredRecord>> {
        match self.store.get_record(entity, id).await? {
            Some(record) => Ok(Some(checked(entity, record)?)),
            None => Ok(None),
        }
    }

    /// All records of an entity type, verified and decoded, ordered by id.
    ///
    /// Fails on the first corrupted record.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        entity: EntityType,
    ) -> Result<Vec<VersionedRecord<T>>> {
        let records = self.store.get_all_records(entity).await?;
        decode_all(entity, records)
    }

    /// Records whose index field equals `value`.
    pub async fn get_all_by_index<T: DeserializeOwned>(
        &self,
        entity: EntityType,
        index: &str,
        value: &Value,
    ) -> Result<Vec<VersionedRecord<T>>> {
        let records = self.store.get_records_by_index(entity, index, value).await?;
        decode_all(entity, records)
    }

    /// Ids of records whose checksum no longer matches their data.
    pub async fn scan_integrity(&self, entity: EntityType) -> Result<Vec<String>> {
        let records = self.store.get_all_records(entity).await?;
        let corrupted: Vec<String> = records
            .into_iter()
            .filter(|r| !verify_integrity(r))
            .map(|r| r.id)
            .collect();

        if !corrupted.is_empty() {
            tracing::error!(%entity, count = corrupted.len(), "integrity scan found corrupted records");
        }
        Ok(corrupted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a record as-is.
    ///
    /// Refuses a record whose checksum does not describe its data.
    pub async fn put<T: Serialize>(
        &self,
        entity: EntityType,
        record: &VersionedRecord<T>,
    ) -> Result<()> {
        let record = record.to_json()?;
        record.verify(entity)?;
        self.store.put_record(entity, &record).await
    }

    /// Delete a record. Returns whether it existed.
    pub async fn delete(&self, entity: EntityType, id: &str) -> Result<bool> {
        self.store.delete_record(entity, id).await
    }

    /// Write new local data for `id`.
    ///
    /// Creates the record at version 1, or bumps the version of the existing
    /// one. The result is `PENDING` until the remote confirms it.
    pub async fn save<T: Serialize>(
        &self,
        entity: EntityType,
        id: &str,
        data: &T,
    ) -> Result<StoredRecord> {
        let data = serde_json::to_value(data)?;
        let record = match self.get_value(entity, id).await? {
            Some(existing) => existing.next_version(data)?,
            None => wrap_with_version(data, id, None)?,
        };

        self.store.put_record(entity, &record).await?;
        tracing::debug!(%entity, id, version = record.version, "saved local record");
        Ok(record)
    }

    /// Store the server's copy of an entity (last write wins).
    ///
    /// The existing local record, if any, is replaced by `data` with its
    /// version bumped. The result is `COMPLETED` with `synced_at = at`.
    pub async fn apply_remote(
        &self,
        entity: EntityType,
        id: &str,
        data: Value,
        at: i64,
    ) -> Result<StoredRecord> {
        // The remote copy is authoritative, so a corrupted local record is
        // simply overwritten.
        let existing = self.store.get_record(entity, id).await?;
        let mut record = match existing {
            Some(existing) => existing.next_version(data)?,
            None => wrap_with_version(data, id, None)?,
        };
        record.mark_synced(at);

        self.store.put_record(entity, &record).await?;
        Ok(record)
    }

    /// Update only the sync metadata of a record.
    ///
    /// Returns `false` if the record does not exist. Data, version and
    /// checksum are untouched.
    pub async fn set_sync_status(
        &self,
        entity: EntityType,
        id: &str,
        status: SyncStatus,
    ) -> Result<bool> {
        let Some(record) = self.store.get_record(entity, id).await? else {
            return Ok(false);
        };
        self.store
            .put_record(entity, &record.with_status(status))
            .await?;
        Ok(true)
    }

    /// Replace a collection with a freshly pulled one.
    ///
    /// Local records that are not `COMPLETED` carry edits the remote has not
    /// seen yet and are kept as they are. Every other incoming entity is
    /// stored as synced, with its version bumped if the data changed. Synced
    /// records absent from `incoming` are dropped. Returns how many incoming
    /// entities were applied.
    pub async fn replace_all(
        &self,
        entity: EntityType,
        incoming: Vec<(String, Value)>,
        at: i64,
    ) -> Result<usize> {
        let mut current: BTreeMap<String, StoredRecord> = self
            .store
            .get_all_records(entity)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut next = Vec::with_capacity(incoming.len());
        let mut applied = 0;

        for (id, data) in incoming {
            match current.remove(&id) {
                Some(local) if local.sync_status != SyncStatus::Completed => {
                    tracing::debug!(%entity, id = %id, "keeping unsynced local record over pulled copy");
                    next.push(local);
                }
                Some(local) => {
                    let mut record = if Checksum::of_data(&data)? == local.checksum {
                        local
                    } else {
                        local.next_version(data)?
                    };
                    record.mark_synced(at);
                    next.push(record);
                    applied += 1;
                }
                None => {
                    let mut record = wrap_with_version(data, id, None)?;
                    record.mark_synced(at);
                    next.push(record);
                    applied += 1;
                }
            }
        }

        next.extend(
            current
                .into_values()
                .filter(|r| r.sync_status != SyncStatus::Completed),
        );

        self.store.replace_records(entity, &next).await?;
        Ok(applied)
    }
}

fn checked(entity: EntityType, record: StoredRecord) -> Result<StoredRecord> {
    if let Err(e) = record.verify(entity) {
        tracing::error!(%entity, id = %record.id, "checksum mismatch on read");
        return Err(StoreError::from(e));
    }
    Ok(record)
}

fn decode_all<T: DeserializeOwned>(
    entity: EntityType,
    records: Vec<StoredRecord>,
) -> Result<Vec<VersionedRecord<T>>> {
    records
        .into_iter()
        .map(|r| -> Result<VersionedRecord<T>> { Ok(checked(entity, r)?.decode()?) })
        .collect()
}
