//! SyncQueue: durable outbound mutations, drained one pass at a time.
//!
//! # Pass algorithm
//!
//! 1. Single-flight: a call made while a pass runs returns
//!    [`ProcessOutcome::AlreadyRunning`] without touching anything. The
//!    running pass remembers the request and schedules one more pass when
//!    it ends, so work queued meanwhile is not stranded.
//! 2. Offline: returns [`ProcessOutcome::Offline`] without touching anything.
//! 3. Load every `PENDING` item in processing order (priority descending,
//!    retry count ascending, oldest first).
//! 4. For each item, strictly one at a time: re-check connectivity and stop
//!    if it dropped, mark `IN_PROGRESS`, dispatch, then
//!    - success: write the server copy back into the local store
//!      (`COMPLETED`) and complete the item. The write-back is skipped when
//!      a later mutation of the same entity is still queued; that one owns
//!      the local record now.
//!    - network failure: back to `PENDING`, retry budget untouched
//!    - application failure: one retry consumed, `FAILED` once exhausted
//!
//! Backoff does not gate which items a pass picks up. It decides when the
//! next automatic pass is scheduled: after application failures from the
//! lowest retry count in the pass, after network failures from the number
//! of consecutive passes that reached nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use tillsync_core::{
    now_millis, CoreError, EntityType, FailureOutcome, OperationType, Priority, QueueItem,
    QueueItemId, RetryPolicy, SyncStatus,
};
use tillsync_store::{LocalStore, QueueStats, Store};

use crate::dispatch::{dispatch, Dispatched};
use crate::error::{RemoteError, Result, SyncError};
use crate::events::{EventBus, ListenerId, QueueEvent, QueueReport};
use crate::network::NetworkMonitor;
use crate::remote::RemoteApi;
use crate::scheduler::RetryScheduler;

/// Configuration for queue processing.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retry budget and backoff.
    pub retry: RetryPolicy,
    /// Keep `COMPLETED` items for audit until [`SyncQueue::clear_completed`].
    pub retain_completed: bool,
    /// Schedule follow-up passes automatically: after retryable failures
    /// and after manual retries. Disable to drive every pass by hand.
    pub schedule_retries: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            retain_completed: true,
            schedule_retries: true,
        }
    }
}

impl QueueConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retain_completed(mut self, retain: bool) -> Self {
        self.retain_completed = retain;
        self
    }

    pub fn with_schedule_retries(mut self, schedule: bool) -> Self {
        self.schedule_retries = schedule;
        self
    }
}

/// Result of a [`SyncQueue::process_queue`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another pass was in flight; nothing was done.
    AlreadyRunning,
    /// The network monitor reported offline; nothing was done.
    Offline,
    /// A pass ran.
    Processed(QueueReport),
}

impl ProcessOutcome {
    pub fn report(&self) -> Option<&QueueReport> {
        match self {
            ProcessOutcome::Processed(report) => Some(report),
            _ => None,
        }
    }
}

/// Resets the single-flight flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner<S, R, N> {
    store: Arc<S>,
    local: LocalStore<S>,
    remote: Arc<R>,
    network: Arc<N>,
    config: QueueConfig,
    processing: AtomicBool,
    /// A pass was requested while another was running.
    rerun: AtomicBool,
    /// Consecutive passes whose attempts all failed at the network level.
    network_streak: AtomicU32,
    events: EventBus,
    scheduler: RetryScheduler,
}

/// The outbound sync queue. Cheap to clone; clones share all state.
pub struct SyncQueue<S, R, N> {
    inner: Arc<Inner<S, R, N>>,
}

impl<S, R, N> Clone for SyncQueue<S, R, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, R, N> SyncQueue<S, R, N>
where
    S: Store + 'static,
    R: RemoteApi + 'static,
    N: NetworkMonitor + 'static,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, network: Arc<N>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                local: LocalStore::new(Arc::clone(&store)),
                store,
                remote,
                network,
                config,
                processing: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                network_streak: AtomicU32::new(0),
                events: EventBus::new(),
                scheduler: RetryScheduler::new(),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn add_event_listener(
        &self,
        listener: impl Fn(&QueueEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.subscribe(listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Whether a pass is running right now.
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Enqueue
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a mutation with the entity type's default priority.
    pub async fn enqueue(
        &self,
        entity: EntityType,
        operation: OperationType,
        payload: Value,
    ) -> Result<QueueItemId> {
        self.enqueue_with_priority(entity, operation, payload, entity.default_priority())
            .await
    }

    /// Append a mutation. Durable when this returns.
    ///
    /// Updates and deletes must name the entity in `payload.id`.
    pub async fn enqueue_with_priority(
        &self,
        entity: EntityType,
        operation: OperationType,
        payload: Value,
        priority: Priority,
    ) -> Result<QueueItemId> {
        let item = QueueItem::new(entity, operation, payload, priority);
        if operation != OperationType::Create && item.entity_id().is_none() {
            return Err(SyncError::Core(CoreError::MissingId(entity)));
        }

        self.inner.store.insert_queue_item(&item).await?;
        tracing::debug!(
            item_id = %item.id,
            %entity,
            operation = %operation,
            priority = %priority,
            "enqueued"
        );
        Ok(item.id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one pass over the `PENDING` items.
    ///
    /// Storage failures abort the pass and are returned; items not yet
    /// reached stay `PENDING`.
    pub async fn process_queue(&self) -> Result<ProcessOutcome> {
        let inner = &self.inner;

        // Raised before the single-flight check: a pass that is ending has
        // either not released the flag yet, and then sees the request, or
        // has released it, and then this call runs the pass itself.
        inner.rerun.store(true, Ordering::SeqCst);
        if inner
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("queue pass already running, another one requested");
            return Ok(ProcessOutcome::AlreadyRunning);
        }
        inner.rerun.store(false, Ordering::SeqCst);

        let outcome = {
            let _guard = PassGuard(&inner.processing);
            self.run_pass().await
        };

        if inner.rerun.swap(false, Ordering::SeqCst) {
            tracing::debug!("pass requested while running, scheduling another");
            self.schedule_pass(Duration::ZERO);
        }
        outcome
    }

    async fn run_pass(&self) -> Result<ProcessOutcome> {
        let inner = &self.inner;

        if !inner.network.is_online() {
            tracing::debug!("offline, queue pass skipped");
            return Ok(ProcessOutcome::Offline);
        }

        let items = inner.store.get_queue_items(Some(SyncStatus::Pending)).await?;
        let total = items.len();
        tracing::debug!(pending = total, "queue pass started");

        let mut report = QueueReport::default();
        let mut min_retry: Option<u32> = None;

        for (index, item) in items.into_iter().enumerate() {
            if !inner.network.is_online() {
                report.aborted_offline = true;
                report.skipped = total - index;
                tracing::info!(skipped = report.skipped, "connectivity lost, queue pass aborted");
                break;
            }

            // The item may have been removed or retried since the pass began.
            let item = match inner.store.get_queue_item(&item.id).await? {
                Some(current) if current.status == SyncStatus::Pending => current,
                _ => continue,
            };

            self.process_item(item, index + 1, total, &mut report, &mut min_retry)
                .await?;
        }

        tracing::debug!(
            attempted = report.attempted,
            completed = report.completed,
            requeued = report.requeued,
            failed = report.failed,
            "queue pass finished"
        );
        inner.events.emit(QueueEvent::Complete {
            report: report.clone(),
        });

        let network_retry = self.track_network_streak(&report);
        if inner.config.schedule_retries && !report.aborted_offline {
            let next = match (min_retry, network_retry) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            if let Some(n) = next {
                self.schedule_pass(inner.config.retry.backoff_delay(n));
            }
        }

        Ok(ProcessOutcome::Processed(report))
    }

    /// Backoff exponent for the network failures of a finished pass.
    ///
    /// Grows with every pass that requeued items and completed none, and
    /// starts over once anything gets through. Item budgets are untouched.
    fn track_network_streak(&self, report: &QueueReport) -> Option<u32> {
        let streak = &self.inner.network_streak;
        if report.requeued == 0 || report.completed > 0 {
            streak.store(0, Ordering::SeqCst);
            return (report.requeued > 0).then_some(0);
        }
        let previous = streak
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(1)))
            .unwrap_or_else(|n| n);
        Some(previous)
    }

    async fn process_item(
        &self,
        mut item: QueueItem,
        position: usize,
        total: usize,
        report: &mut QueueReport,
        min_retry: &mut Option<u32>,
    ) -> Result<()> {
        let inner = &self.inner;

        item.mark_in_progress(now_millis());
        inner.store.update_queue_item(&item).await?;
        report.attempted += 1;
        self.emit_progress(&item, position, total);

        match dispatch(inner.remote.as_ref(), &item).await {
            Ok(done) => {
                // The remote has accepted the mutation: the item completes
                // even if the local write-back fails, so it is never sent twice.
                let write_back = self.write_back(&item, done).await;

                item.mark_completed();
                if inner.config.retain_completed {
                    inner.store.update_queue_item(&item).await?;
                } else {
                    inner.store.delete_queue_item(&item.id).await?;
                }
                report.completed += 1;
                self.emit_progress(&item, position, total);

                if let Err(e) = write_back {
                    tracing::error!(item_id = %item.id, error = %e, "write-back after sync failed");
                    return Err(e);
                }
                tracing::debug!(item_id = %item.id, entity = %item.entity_type, "synced");
            }
            Err(e) if e.is_network() => {
                item.record_network_failure(e.message());
                inner.store.update_queue_item(&item).await?;
                report.requeued += 1;
                tracing::warn!(item_id = %item.id, error = %e, "network failure, item requeued");
                self.emit_error(&item, &e, false);
            }
            Err(e) => {
                let outcome = item.record_application_failure(e.message(), &inner.config.retry);
                inner.store.update_queue_item(&item).await?;

                match outcome {
                    FailureOutcome::Exhausted { retry_count } => {
                        report.failed += 1;
                        tracing::error!(
                            item_id = %item.id,
                            entity = %item.entity_type,
                            retry_count,
                            error = %e,
                            "retries exhausted, item failed"
                        );
                        if let Some(id) = item.entity_id() {
                            inner
                                .local
                                .set_sync_status(item.entity_type, &id, SyncStatus::Failed)
                                .await?;
                        }
                        self.emit_error(&item, &e, true);
                    }
                    FailureOutcome::RetryScheduled { retry_count } => {
                        report.retry_scheduled += 1;
                        *min_retry = Some(min_retry.map_or(retry_count, |m| m.min(retry_count)));
                        tracing::warn!(
                            item_id = %item.id,
                            retry_count,
                            error = %e,
                            "remote rejected item, will retry"
                        );
                        self.emit_error(&item, &e, false);
                    }
                    FailureOutcome::Requeued => {}
                }
            }
        }

        Ok(())
    }

    async fn write_back(&self, item: &QueueItem, done: Dispatched) -> Result<()> {
        let entity = item.entity_type;
        let id = match &done {
            Dispatched::Upserted { id, .. } | Dispatched::Deleted { id } => id.clone(),
        };
        if self.superseded(item, &id).await? {
            tracing::debug!(
                item_id = %item.id,
                %entity,
                entity_id = %id,
                "later mutation queued, write-back skipped"
            );
            return Ok(());
        }

        match done {
            Dispatched::Upserted { id, data } => {
                self.inner
                    .local
                    .apply_remote(entity, &id, data, now_millis())
                    .await?;
            }
            Dispatched::Deleted { id } => {
                self.inner.local.delete(entity, &id).await?;
            }
        }
        Ok(())
    }

    /// Whether a mutation of the same entity was enqueued after `item` and
    /// has not been sent yet.
    async fn superseded(&self, item: &QueueItem, entity_id: &str) -> Result<bool> {
        let queued = self
            .inner
            .store
            .get_queue_items_by_entity(item.entity_type)
            .await?;
        Ok(queued.iter().any(|other| {
            other.id > item.id
                && matches!(other.status, SyncStatus::Pending | SyncStatus::InProgress)
                && other.entity_id().as_deref() == Some(entity_id)
        }))
    }

    fn emit_progress(&self, item: &QueueItem, position: usize, total: usize) {
        self.inner.events.emit(QueueEvent::Progress {
            item_id: item.id.clone(),
            entity: item.entity_type,
            operation: item.operation_type,
            status: item.status,
            position,
            total,
        });
    }

    fn emit_error(&self, item: &QueueItem, error: &RemoteError, terminal: bool) {
        self.inner.events.emit(QueueEvent::Error {
            item_id: item.id.clone(),
            entity: item.entity_type,
            operation: item.operation_type,
            message: error.message().to_string(),
            retry_count: item.retry_count,
            terminal,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a pass after `delay`, unless an earlier one is already scheduled.
    pub fn schedule_pass(&self, delay: Duration) -> bool {
        let queue = self.clone();
        self.inner.scheduler.schedule(delay, queue.deferred_pass())
    }

    fn deferred_pass(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.process_queue().await {
                tracing::warn!(error = %e, "scheduled queue pass failed");
            }
        })
    }

    /// Drop the pending scheduled pass, e.g. when going offline.
    pub fn cancel_scheduled(&self) {
        self.inner.scheduler.cancel_pending();
    }

    pub fn has_scheduled_pass(&self) -> bool {
        self.inner.scheduler.has_pending()
    }

    /// Stop all scheduled work permanently.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manual retry
    // ─────────────────────────────────────────────────────────────────────────

    /// Reset one item's retry budget and schedule a pass.
    pub async fn retry_single_item(&self, id: &QueueItemId) -> Result<()> {
        let mut item = self
            .inner
            .store
            .get_queue_item(id)
            .await?
            .ok_or_else(|| SyncError::ItemNotFound(id.clone()))?;

        if matches!(item.status, SyncStatus::Completed | SyncStatus::InProgress) {
            return Err(SyncError::NotRetryable {
                id: id.clone(),
                status: item.status,
            });
        }

        self.reset(&mut item).await?;
        tracing::info!(item_id = %id, "item reset for retry");

        if self.inner.config.schedule_retries {
            self.schedule_pass(Duration::ZERO);
        }
        Ok(())
    }

    /// Reset every `FAILED` item and schedule a pass. Returns the count.
    pub async fn retry_failed(&self) -> Result<usize> {
        let failed = self
            .inner
            .store
            .get_queue_items(Some(SyncStatus::Failed))
            .await?;
        let count = failed.len();

        for mut item in failed {
            self.reset(&mut item).await?;
        }

        if count > 0 {
            tracing::info!(count, "failed items reset for retry");
            if self.inner.config.schedule_retries {
                self.schedule_pass(Duration::ZERO);
            }
        }
        Ok(count)
    }

    async fn reset(&self, item: &mut QueueItem) -> Result<()> {
        item.reset_for_retry();
        self.inner.store.update_queue_item(item).await?;
        if let Some(id) = item.entity_id() {
            self.inner
                .local
                .set_sync_status(item.entity_type, &id, SyncStatus::Pending)
                .await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Introspection & maintenance
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        Ok(self.inner.store.queue_stats().await?)
    }

    pub async fn get_item(&self, id: &QueueItemId) -> Result<Option<QueueItem>> {
        Ok(self.inner.store.get_queue_item(id).await?)
    }

    /// Items in processing order, optionally filtered by status.
    pub async fn list_items(&self, status: Option<SyncStatus>) -> Result<Vec<QueueItem>> {
        Ok(self.inner.store.get_queue_items(status).await?)
    }

    pub async fn remove_item(&self, id: &QueueItemId) -> Result<bool> {
        Ok(self.inner.store.delete_queue_item(id).await?)
    }

    /// Purge `COMPLETED` items. Returns the count.
    pub async fn clear_completed(&self) -> Result<usize> {
        let n = self
            .inner
            .store
            .delete_queue_items_by_status(SyncStatus::Completed)
            .await?;
        tracing::debug!(count = n, "completed items cleared");
        Ok(n)
    }

    /// Purge `FAILED` items without retrying them. Returns the count.
    pub async fn purge_failed(&self) -> Result<usize> {
        let n = self
            .inner
            .store
            .delete_queue_items_by_status(SyncStatus::Failed)
            .await?;
        tracing::info!(count = n, "failed items purged");
        Ok(n)
    }

    /// Return items left `IN_PROGRESS` by an interrupted pass to `PENDING`.
    ///
    /// Their retry count is untouched: the interrupted attempt never got an
    /// answer. Call before the first pass after start-up.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        if self.is_processing() {
            return Ok(0);
        }

        let stuck = self
            .inner
            .store
            .get_queue_items(Some(SyncStatus::InProgress))
            .await?;
        let count = stuck.len();

        for mut item in stuck {
            item.status = SyncStatus::Pending;
            self.inner.store.update_queue_item(&item).await?;
        }

        if count > 0 {
            tracing::info!(count, "interrupted items returned to pending");
        }
        Ok(count)
    }
}
