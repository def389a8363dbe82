//! Error types for tillsync core.

use thiserror::Error;

use crate::types::EntityType;

/// Core errors raised while encoding, decoding or verifying records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    /// Stored checksum does not match the data at rest.
    #[error("integrity violation on {entity} {id}: expected checksum {expected}, got {actual}")]
    Integrity {
        entity: EntityType,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("missing entity id in payload for {0}")]
    MissingId(EntityType),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            CoreError::DecodingError(e.to_string())
        } else {
            CoreError::EncodingError(e.to_string())
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
