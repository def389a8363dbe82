//! Queue events and the publish/subscribe bus that delivers them.
//!
//! Two ways to listen:
//!
//! - callbacks registered with [`EventBus::subscribe`], run inline during the
//!   pass. A panicking callback is logged and skipped; it neither stops
//!   delivery to the others nor aborts the pass.
//! - a [`broadcast`] receiver from [`EventBus::channel`] for async consumers.
//!   Slow receivers lag rather than block the queue.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use tillsync_core::{EntityType, OperationType, QueueItemId, SyncStatus};

/// Capacity of the broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

/// Summary of one queue pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueReport {
    /// Items taken out of `PENDING` and dispatched.
    pub attempted: usize,
    pub completed: usize,
    /// Network failures, back to `PENDING` with the budget untouched.
    pub requeued: usize,
    /// Application failures with retries left.
    pub retry_scheduled: usize,
    /// Application failures that exhausted the budget.
    pub failed: usize,
    /// Items left untouched because connectivity dropped mid-pass.
    pub skipped: usize,
    /// Whether the pass stopped early on a disconnect.
    pub aborted_offline: bool,
}

/// A notification from the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// An item changed state during a pass.
    #[serde(rename_all = "camelCase")]
    Progress {
        item_id: QueueItemId,
        entity: EntityType,
        operation: OperationType,
        status: SyncStatus,
        /// 1-based position in the pass.
        position: usize,
        total: usize,
    },
    /// A pass finished.
    Complete { report: QueueReport },
    /// An attempt failed.
    #[serde(rename_all = "camelCase")]
    Error {
        item_id: QueueItemId,
        entity: EntityType,
        operation: OperationType,
        message: String,
        retry_count: u32,
        /// The item is now `FAILED` and needs a manual retry.
        terminal: bool,
    },
}

/// Handle for removing a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// Publish/subscribe hub for [`QueueEvent`]s.
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    channel: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel,
        }
    }

    /// Register a callback.
    pub fn subscribe(&self, listener: impl Fn(&QueueEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Receiver for async consumers. Only events emitted after this call
    /// are delivered.
    pub fn channel(&self) -> broadcast::Receiver<QueueEvent> {
        self.channel.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver an event to every callback, then to the channel.
    pub fn emit(&self, event: QueueEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let listeners: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!(listener = id.0, "queue event listener panicked");
            }
        }

        // No receivers is fine.
        let _ = self.channel.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
