//! # tillsync sync
//!
//! Outbound synchronization for the tillsync engine: the durable sync queue
//! and the collaborators it talks to.
//!
//! ## Overview
//!
//! Local mutations are appended to the [`SyncQueue`]. A queue pass drains
//! `PENDING` items one at a time through the [`RemoteApi`], gated by the
//! [`NetworkMonitor`]. Failures are classified: network failures are retried
//! for free, application failures consume a bounded retry budget.
//!
//! ## Key Properties
//!
//! - **Single-flight**: at most one pass runs at a time
//! - **Sequential**: items within a pass are never dispatched in parallel
//! - **Resumable**: a disconnect mid-pass leaves untried items `PENDING`
//! - **Isolated listeners**: a panicking event listener is skipped
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tillsync_core::{EntityType, OperationType};
//! use tillsync_store::MemoryStore;
//! use tillsync_sync::{ManualNetworkMonitor, MemoryRemote, QueueConfig, SyncQueue};
//!
//! async fn example() -> tillsync_sync::Result<()> {
//!     let queue = SyncQueue::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryRemote::new()),
//!         Arc::new(ManualNetworkMonitor::online()),
//!         QueueConfig::default(),
//!     );
//!
//!     queue
//!         .enqueue(EntityType::Sale, OperationType::Create, json!({"id": "s-1"}))
//!         .await?;
//!     let outcome = queue.process_queue().await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Item lifecycle
//!
//! ```text
//! enqueue -> PENDING -> IN_PROGRESS -> COMPLETED
//!               ^            |
//!               +------------+  network failure / retryable rejection
//!                            |
//!                            +-----> FAILED (budget spent) -- retry --> PENDING
//! ```

pub mod dispatch;
pub mod error;
pub mod events;
pub mod http;
pub mod network;
pub mod queue;
pub mod remote;
pub mod scheduler;

pub use dispatch::{dispatch, route, Dispatched, Route};
pub use error::{RemoteError, Result, SyncError};
pub use events::{EventBus, ListenerId, QueueEvent, QueueReport};
pub use http::{unwrap_envelope, CredentialProvider, HttpConfig, HttpRemoteApi, StaticToken};
pub use network::{ManualNetworkMonitor, NetworkMonitor};
pub use queue::{ProcessOutcome, QueueConfig, SyncQueue};
pub use remote::{memory::MemoryRemote, memory::RemoteCall, memory::RemoteOp, RemoteApi, RemoteResult};
pub use scheduler::RetryScheduler;
