//! Error types for the sync module.

use thiserror::Error;

use tillsync_core::{CoreError, EntityType, QueueItemId, SyncStatus};
use tillsync_store::StoreError;

/// Errors returned by a [`RemoteApi`](crate::RemoteApi).
///
/// The split between network and application failures decides whether a
/// failed attempt consumes retry budget.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Connectivity lost or the transport failed before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// No response within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The remote answered and rejected the request.
    #[error("remote rejected request (status {status:?}): {message}")]
    Application {
        status: Option<u16>,
        message: String,
    },
}

impl RemoteError {
    pub fn application(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Application {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Transient failures that must not count against the retry budget.
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Timeout(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Application { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// The message stored on a failed queue item.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Network(m) | RemoteError::Timeout(m) => m,
            RemoteError::Application { message, .. } => message,
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local storage failed.
    #[error("store error: {0}")]
    Store(StoreError),

    /// A stored record no longer matches its checksum.
    #[error("integrity violation on {entity} {id}: {detail}")]
    Integrity {
        entity: EntityType,
        id: String,
        detail: String,
    },

    /// Remote call failed outside of queue processing (e.g. a pull).
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No queue item with this id.
    #[error("queue item not found: {0}")]
    ItemNotFound(QueueItemId),

    /// The item is completed or currently being processed.
    #[error("queue item {id} cannot be retried while {status}")]
    NotRetryable { id: QueueItemId, status: SyncStatus },

    /// Invalid payload or encoding failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// A collaborator could not be constructed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Integrity { entity, id, detail } => {
                SyncError::Integrity { entity, id, detail }
            }
            other => SyncError::Store(other),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(RemoteError::Network("reset".into()).is_network());
        assert!(RemoteError::Timeout("30s".into()).is_network());

        let rejected = RemoteError::application(422, "invalid email");
        assert!(!rejected.is_network());
        assert_eq!(rejected.status(), Some(422));
        assert_eq!(rejected.message(), "invalid email");
        assert!(RemoteError::application(404, "gone").is_not_found());
    }

    #[test]
    fn test_integrity_is_lifted_out_of_store_errors() {
        let err: SyncError = StoreError::Integrity {
            entity: EntityType::Sale,
            id: "s1".into(),
            detail: "bad".into(),
        }
        .into();
        assert!(matches!(err, SyncError::Integrity { .. }));

        let err: SyncError = StoreError::NotFound("x".into()).into();
        assert!(matches!(err, SyncError::Store(_)));
    }
}
