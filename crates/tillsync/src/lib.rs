//! # tillsync
//!
//! The offline-first sync engine for a point-of-sale client.
//!
//! ## Overview
//!
//! Every local mutation is written durably first and then queued for the
//! remote. The engine pushes the queue whenever connectivity allows and
//! periodically refreshes reference data (products, contacts, settings).
//!
//! - **Local store**: versioned records with content checksums
//! - **Sync queue**: prioritized, retried, single-flight outbound mutations
//! - **Orchestrator**: push then pull, with per-kind freshness thresholds
//! - **Engine**: one explicit instance owning all of the above plus the
//!   background loop
//!
//! ## Key Properties
//!
//! - **Durable first**: a crash never loses a local write
//! - **Integrity**: a record whose checksum does not match is never returned
//! - **Unsynced edits win**: a pull never overwrites a record still waiting
//!   to be pushed
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tillsync::{Engine, EngineConfig};
//! use tillsync::core::EntityType;
//! use tillsync::sync::{HttpConfig, HttpRemoteApi, ManualNetworkMonitor, StaticToken};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = HttpRemoteApi::new(
//!         HttpConfig::new("https://pos.example.com/api"),
//!         Arc::new(StaticToken("token".into())),
//!     )?;
//!     let network = Arc::new(ManualNetworkMonitor::online());
//!
//!     let engine = Engine::open("till.db", Arc::new(remote), network, EngineConfig::default())?;
//!     engine.start().await?;
//!
//!     engine
//!         .record_sale("sale-1", &json!({"totalCents": 1250, "items": []}))
//!         .await?;
//!     engine
//!         .save(EntityType::Contact, "c-1", &json!({"name": "Ada"}))
//!         .await?;
//!
//!     let report = engine.sync_now(false).await?;
//!     println!("{:?}", report);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tillsync::core` - Records, queue items, checksums, retry policy
//! - `tillsync::store` - Storage abstraction, SQLite and in-memory backends
//! - `tillsync::sync` - Sync queue, remote API, network monitor

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;

pub use tillsync_core as core;
pub use tillsync_store as store;
pub use tillsync_sync as sync;

pub use config::{EngineConfig, FreshnessConfig};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use orchestrator::{PullOutcome, SyncOrchestrator, SyncReport};

pub use tillsync_core::{EntityType, OperationType, Priority, ReferenceKind, SyncStatus, VersionedRecord};
pub use tillsync_store::{LocalStore, MemoryStore, SqliteStore, StoredRecord};
pub use tillsync_sync::{ProcessOutcome, QueueEvent, QueueReport, SyncQueue};
