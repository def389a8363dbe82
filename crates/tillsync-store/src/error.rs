//! Error types for the store module.

use thiserror::Error;

use tillsync_core::{CoreError, EntityType};

/// Errors that can occur during store operations.
///
/// Every variant except [`StoreError::Integrity`] is a durability failure:
/// the store never retries internally, the caller decides what to do.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record or queue item serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Queue item not found.
    #[error("queue item not found: {0}")]
    NotFound(String),

    /// Queue item id already present.
    #[error("queue item already exists: {0}")]
    AlreadyExists(String),

    /// Index name not declared for the entity type.
    #[error("unknown index {index} on {entity}")]
    UnknownIndex { entity: EntityType, index: String },

    /// Stored data no longer matches its checksum, or cannot be parsed.
    #[error("integrity violation on {entity} {id}: {detail}")]
    Integrity {
        entity: EntityType,
        id: String,
        detail: String,
    },

    /// Invalid data in storage or in a request.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// Blocking task could not be joined.
    #[error("background task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::Integrity { .. })
    }
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Integrity {
                entity,
                id,
                expected,
                actual,
            } => StoreError::Integrity {
                entity,
                id,
                detail: format!("expected checksum {}, got {}", expected, actual),
            },
            other => StoreError::Serialization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
