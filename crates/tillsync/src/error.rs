//! Error types for the engine.

use thiserror::Error;

use tillsync_core::{CoreError, EntityType};
use tillsync_store::StoreError;
use tillsync_sync::{RemoteError, SyncError};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local storage failed. Surfaced at the call that caused it.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// A stored record failed its checksum.
    #[error("integrity violation on {entity} {id}: {detail}")]
    Integrity {
        entity: EntityType,
        id: String,
        detail: String,
    },

    /// Queue or sync error.
    #[error("sync error: {0}")]
    Sync(SyncError),

    /// Remote call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Encoding error or invalid payload.
    #[error("invalid data: {0}")]
    Core(#[from] CoreError),

    /// Operation not valid in the engine's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl EngineError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, EngineError::Integrity { .. })
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Integrity { entity, id, detail } => {
                EngineError::Integrity { entity, id, detail }
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<SyncError> for EngineError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Integrity { entity, id, detail } => {
                EngineError::Integrity { entity, id, detail }
            }
            SyncError::Store(e) => EngineError::Store(e),
            SyncError::Remote(e) => EngineError::Remote(e),
            SyncError::Core(e) => EngineError::Core(e),
            other => EngineError::Sync(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
