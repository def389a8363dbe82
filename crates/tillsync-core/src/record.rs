//! VersionedRecord: the durable wrapper around every locally stored entity.
//!
//! A record is created at version 1 on the first local write and replaced in
//! place on every later write, with the version incremented and the checksum
//! recomputed. The checksum always describes `data` at rest; a mismatch means
//! the stored bytes were corrupted and the record must not be trusted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::Checksum;
use crate::error::{CoreError, Result};
use crate::types::{now_millis, EntityType, SyncStatus};

/// First version assigned to a record.
pub const INITIAL_VERSION: u64 = 1;

/// An entity plus version, checksum and sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord<T = Value> {
    pub id: String,
    pub data: T,
    /// Monotonically increasing per entity id.
    pub version: u64,
    pub checksum: Checksum,
    pub created_at: i64,
    pub last_modified: i64,
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<i64>,
}

/// Wrap entity data into a fresh record.
///
/// `version` defaults to [`INITIAL_VERSION`]. Timestamps are stamped with the
/// current time and the record starts out `PENDING`.
pub fn wrap_with_version<T: Serialize>(
    data: T,
    id: impl Into<String>,
    version: Option<u64>,
) -> Result<VersionedRecord<T>> {
    let checksum = Checksum::of_data(&data)?;
    let now = now_millis();
    Ok(VersionedRecord {
        id: id.into(),
        data,
        version: version.unwrap_or(INITIAL_VERSION),
        checksum,
        created_at: now,
        last_modified: now,
        sync_status: SyncStatus::Pending,
        synced_at: None,
    })
}

/// Recompute the checksum of `record.data` and compare with the stored one.
pub fn verify_integrity<T: Serialize>(record: &VersionedRecord<T>) -> bool {
    match Checksum::of_data(&record.data) {
        Ok(actual) => actual == record.checksum,
        Err(_) => false,
    }
}

impl<T: Serialize> VersionedRecord<T> {
    /// Successor of this record carrying new data.
    ///
    /// Keeps `id` and `created_at`, bumps the version, recomputes the checksum
    /// and resets the sync status to `PENDING`.
    pub fn next_version(&self, data: T) -> Result<VersionedRecord<T>> {
        let checksum = Checksum::of_data(&data)?;
        Ok(VersionedRecord {
            id: self.id.clone(),
            data,
            version: self.version + 1,
            checksum,
            created_at: self.created_at,
            last_modified: now_millis().max(self.last_modified),
            sync_status: SyncStatus::Pending,
            synced_at: self.synced_at,
        })
    }

    /// Check the checksum, reporting a mismatch as [`CoreError::Integrity`].
    pub fn verify(&self, entity: EntityType) -> Result<()> {
        let actual = Checksum::of_data(&self.data)?;
        if actual == self.checksum {
            Ok(())
        } else {
            Err(CoreError::Integrity {
                entity,
                id: self.id.clone(),
                expected: self.checksum.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    /// Convert the data to a JSON value for storage.
    pub fn to_json(&self) -> Result<VersionedRecord<Value>> {
        Ok(VersionedRecord {
            id: self.id.clone(),
            data: serde_json::to_value(&self.data)?,
            version: self.version,
            checksum: self.checksum.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
            sync_status: self.sync_status,
            synced_at: self.synced_at,
        })
    }
}

impl<T> VersionedRecord<T> {
    /// Mark the record as confirmed by the remote.
    pub fn mark_synced(&mut self, at: i64) {
        self.sync_status = SyncStatus::Completed;
        self.synced_at = Some(at);
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = status;
        self
    }
}

impl VersionedRecord<Value> {
    /// Decode the JSON data into a typed entity.
    pub fn decode<T: DeserializeOwned>(self) -> Result<VersionedRecord<T>> {
        Ok(VersionedRecord {
            id: self.id,
            data: serde_json::from_value(self.data)?,
            version: self.version,
            checksum: self.checksum,
            created_at: self.created_at,
            last_modified: self.last_modified,
            sync_status: self.sync_status,
            synced_at: self.synced_at,
        })
    }

    /// Look up a top-level data field, used by secondary indexes.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_object().and_then(|obj| obj.get(name))
    }
}
