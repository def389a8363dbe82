//! # tillsync store
//!
//! Durable local state for the tillsync engine: versioned entity records,
//! the outbound sync queue, and per-kind pull timestamps.
//!
//! ## Overview
//!
//! The [`Store`] trait abstracts the backend so the engine stays
//! storage-agnostic. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for testing. [`LocalStore`] sits on top and adds checksum
//! verification and versioning.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`LocalStore`] - Typed, integrity-checked record access
//! - [`QueueStats`] - Queue item counts per status
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tillsync_core::EntityType;
//! use tillsync_store::{LocalStore, SqliteStore};
//!
//! async fn example() -> tillsync_store::Result<()> {
//!     let local = LocalStore::new(Arc::new(SqliteStore::open("pos.db")?));
//!
//!     let sale = serde_json::json!({"id": "s-1", "totalCents": 1250});
//!     let record = local.save(EntityType::Sale, "s-1", &sale).await?;
//!     assert_eq!(record.version, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Durable before return**: SQLite runs with `synchronous=FULL`
//! - **Corruption is surfaced**: checksum mismatches are errors, never repaired
//! - **No internal retries**: storage failures go straight to the caller

pub mod error;
pub mod local;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{QueueStats, Store, StoredRecord};
