//! # tillsync core
//!
//! Pure types for the tillsync engine: versioned records, queue items,
//! checksums and the retry policy.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`VersionedRecord`] - An entity plus version, checksum and sync metadata
//! - [`QueueItem`] - One durable outbound mutation
//! - [`Checksum`] - Content hash over canonical JSON
//! - [`RetryPolicy`] - Retry budget and jittered exponential backoff
//!
//! ## Canonicalization
//!
//! Checksums are computed over canonical JSON. See [`canonical`] module.

pub mod canonical;
pub mod error;
pub mod queue_item;
pub mod record;
pub mod retry;
pub mod types;

pub use canonical::{canonical_bytes, canonical_bytes_of, Checksum};
pub use error::{CoreError, Result};
pub use queue_item::{processing_order, FailureOutcome, QueueItem};
pub use record::{verify_integrity, wrap_with_version, VersionedRecord, INITIAL_VERSION};
pub use retry::RetryPolicy;
pub use types::{
    now_millis, EntityType, OperationType, Priority, QueueItemId, ReferenceKind, SyncStatus,
    SYNC_STATUS_INDEX,
};
