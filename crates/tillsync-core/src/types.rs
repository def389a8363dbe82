//! Strong type definitions for tillsync.
//!
//! Entity kinds, operation kinds, priorities and statuses are closed enums so
//! that every dispatch over them is checked for exhaustiveness at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::error::CoreError;

/// Name of the record-metadata index available on every entity type.
pub const SYNC_STATUS_INDEX: &str = "syncStatus";

/// A logical record kind persisted locally and mirrored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Product,
    Contact,
    Sale,
    BusinessSetting,
}

impl EntityType {
    /// Every entity type, in a stable order.
    pub const ALL: [EntityType; 4] = [
        EntityType::Product,
        EntityType::Contact,
        EntityType::Sale,
        EntityType::BusinessSetting,
    ];

    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "PRODUCT",
            EntityType::Contact => "CONTACT",
            EntityType::Sale => "SALE",
            EntityType::BusinessSetting => "BUSINESS_SETTING",
        }
    }

    /// REST resource segment for this entity.
    pub fn resource(self) -> &'static str {
        match self {
            EntityType::Product => "products",
            EntityType::Contact => "contacts",
            EntityType::Sale => "sales",
            EntityType::BusinessSetting => "business-settings",
        }
    }

    /// Queue priority used when the caller does not pick one.
    ///
    /// Sales carry money and go first; settings changes are rarely urgent.
    pub fn default_priority(self) -> Priority {
        match self {
            EntityType::Sale => Priority::High,
            EntityType::Product | EntityType::Contact => Priority::Medium,
            EntityType::BusinessSetting => Priority::Low,
        }
    }

    /// Data fields that can be looked up with a secondary index.
    pub fn indexed_fields(self) -> &'static [&'static str] {
        match self {
            EntityType::Product => &["sku", "barcode", "category"],
            EntityType::Contact => &["email", "phone", "contactType"],
            EntityType::Sale => &["contactId", "status"],
            EntityType::BusinessSetting => &["key"],
        }
    }

    /// Whether `name` is a declared index for this entity type.
    pub fn has_index(self, name: &str) -> bool {
        name == SYNC_STATUS_INDEX || self.indexed_fields().contains(&name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRODUCT" => Ok(EntityType::Product),
            "CONTACT" => Ok(EntityType::Contact),
            "SALE" => Ok(EntityType::Sale),
            "BUSINESS_SETTING" => Ok(EntityType::BusinessSetting),
            other => Err(CoreError::UnknownValue {
                kind: "entity type",
                value: other.to_string(),
            }),
        }
    }
}

/// The kind of mutation a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Create => "CREATE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(OperationType::Create),
            "UPDATE" => Ok(OperationType::Update),
            "DELETE" => Ok(OperationType::Delete),
            other => Err(CoreError::UnknownValue {
                kind: "operation type",
                value: other.to_string(),
            }),
        }
    }
}

/// Queue priority. Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Numeric rank, higher is more urgent. Used as the stored column value.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Priority::Low),
            1 => Some(Priority::Medium),
            2 => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronization state shared by records and queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 4] = [
        SyncStatus::Pending,
        SyncStatus::InProgress,
        SyncStatus::Completed,
        SyncStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
        }
    }

    /// Terminal states are only left through an explicit reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SyncStatus::Pending),
            "IN_PROGRESS" => Ok(SyncStatus::InProgress),
            "COMPLETED" => Ok(SyncStatus::Completed),
            "FAILED" => Ok(SyncStatus::Failed),
            other => Err(CoreError::UnknownValue {
                kind: "sync status",
                value: other.to_string(),
            }),
        }
    }
}

/// Reference data that is pulled from the backend rather than pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Products,
    Contacts,
    Settings,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 3] = [
        ReferenceKind::Products,
        ReferenceKind::Contacts,
        ReferenceKind::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Products => "products",
            ReferenceKind::Contacts => "contacts",
            ReferenceKind::Settings => "settings",
        }
    }

    /// The local collection a pull of this kind replaces.
    pub fn entity_type(self) -> EntityType {
        match self {
            ReferenceKind::Products => EntityType::Product,
            ReferenceKind::Contacts => EntityType::Contact,
            ReferenceKind::Settings => EntityType::BusinessSetting,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(ReferenceKind::Products),
            "contacts" => Ok(ReferenceKind::Contacts),
            "settings" => Ok(ReferenceKind::Settings),
            other => Err(CoreError::UnknownValue {
                kind: "reference kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Identifier of a queue item. Generated once at enqueue time, never reused.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(String);

static ID_SEQUENCE: AtomicU32 = AtomicU32::new(0);

impl QueueItemId {
    /// Generate a fresh identifier.
    ///
    /// Ids sort in generation order within a process: millisecond timestamp,
    /// then a process-wide counter, then random bits. Items enqueued in the
    /// same millisecond are therefore still attempted in enqueue order.
    pub fn generate() -> Self {
        let seq = ID_SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed);
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{:012x}-{:08x}-{}",
            now_millis().max(0),
            seq,
            &random[..16]
        ))
    }

    /// Wrap an identifier read back from storage.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueItemId({})", self.0)
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
