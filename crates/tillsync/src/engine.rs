//! The Engine: one explicit instance owning the store, queue and scheduling.
//!
//! Local mutations go through [`Engine::save`], [`Engine::remove`] and
//! [`Engine::record_sale`]: the record is written durably first, then the
//! sync intent is enqueued. A crash between the two can lose the intent to
//! sync, never the local data.
//!
//! [`Engine::start`] spawns the background loop:
//!
//! - on every offline to online transition, one full cycle runs at once
//! - while online, a periodic timer runs a cycle every
//!   `background_sync_interval`
//! - while offline, the timer is stopped and scheduled retries are cancelled

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use tillsync_core::{EntityType, OperationType, Priority, QueueItemId, VersionedRecord};
use tillsync_store::{LocalStore, SqliteStore, Store, StoredRecord};
use tillsync_sync::{NetworkMonitor, RemoteApi, SyncQueue};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::orchestrator::{SyncOrchestrator, SyncReport};

/// The offline-first sync engine.
///
/// Construct once and share by reference; there is no global state.
pub struct Engine<S, R, N> {
    local: LocalStore<S>,
    queue: SyncQueue<S, R, N>,
    orchestrator: Arc<SyncOrchestrator<S, R, N>>,
    network: Arc<N>,
    config: EngineConfig,
    cancel: CancellationToken,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl<R, N> Engine<SqliteStore, R, N>
where
    R: RemoteApi + 'static,
    N: NetworkMonitor + 'static,
{
    /// Open (or create) a SQLite-backed engine at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        remote: Arc<R>,
        network: Arc<N>,
        config: EngineConfig,
    ) -> Result<Self> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(Arc::new(store), remote, network, config))
    }
}

impl<S, R, N> Engine<S, R, N>
where
    S: Store + 'static,
    R: RemoteApi + 'static,
    N: NetworkMonitor + 'static,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, network: Arc<N>, config: EngineConfig) -> Self {
        let queue = SyncQueue::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&network),
            config.queue.clone(),
        );
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            queue.clone(),
            remote,
            Arc::clone(&network),
            config.freshness.clone(),
        );

        Self {
            local: LocalStore::new(store),
            queue,
            orchestrator: Arc::new(orchestrator),
            network,
            config,
            cancel: CancellationToken::new(),
            background: Mutex::new(None),
        }
    }

    pub fn local(&self) -> &LocalStore<S> {
        &self.local
    }

    pub fn queue(&self) -> &SyncQueue<S, R, N> {
        &self.queue
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator<S, R, N> {
        &self.orchestrator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Recover interrupted queue items and start the background loop.
    ///
    /// Runs a first cycle right away if online.
    pub async fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::InvalidOperation("engine was shut down".into()));
        }

        let recovered = self.queue.recover_interrupted().await?;

        let mut slot = self
            .background
            .lock()
            .map_err(|_| EngineError::InvalidOperation("background handle poisoned".into()))?;
        if slot.is_some() {
            return Err(EngineError::InvalidOperation("engine already started".into()));
        }

        let handle = tokio::spawn(run_background(
            Arc::clone(&self.orchestrator),
            self.queue.clone(),
            self.network.subscribe(),
            self.config.background_sync_interval,
            self.cancel.clone(),
        ));
        *slot = Some(handle);

        tracing::info!(recovered, "engine started");
        Ok(())
    }

    /// Stop the background loop and every scheduled retry.
    ///
    /// A cycle already running finishes first. The engine cannot be
    /// restarted afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.queue.shutdown();

        let handle = self
            .background
            .lock()
            .map(|mut slot| slot.take())
            .unwrap_or(None);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background loop ended abnormally");
            }
        }
        tracing::info!("engine stopped");
    }

    /// Run one cycle now. Pulls every kind when `force` is set.
    pub async fn sync_now(&self, force: bool) -> Result<SyncReport> {
        self.orchestrator.sync_cycle(force).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Write an entity locally and enqueue it for the remote.
    ///
    /// Enqueued as CREATE if the record is new, UPDATE otherwise, with the
    /// entity type's default priority.
    pub async fn save<T: Serialize>(
        &self,
        entity: EntityType,
        id: &str,
        data: &T,
    ) -> Result<StoredRecord> {
        let exists = self.local.get_value(entity, id).await?.is_some();
        let operation = if exists {
            OperationType::Update
        } else {
            OperationType::Create
        };
        self.save_with(entity, id, data, operation, entity.default_priority())
            .await
    }

    /// Record a completed sale. Sales are always created, at high priority.
    pub async fn record_sale<T: Serialize>(&self, id: &str, sale: &T) -> Result<StoredRecord> {
        if self.local.get_value(EntityType::Sale, id).await?.is_some() {
            return Err(EngineError::InvalidOperation(format!(
                "sale {} already recorded",
                id
            )));
        }
        self.save_with(
            EntityType::Sale,
            id,
            sale,
            OperationType::Create,
            Priority::High,
        )
        .await
    }

    /// Delete an entity locally and enqueue the remote delete.
    ///
    /// Returns whether the entity existed locally. The remote delete is
    /// enqueued either way.
    pub async fn remove(&self, entity: EntityType, id: &str) -> Result<bool> {
        let existed = self.local.delete(entity, id).await?;
        self.queue
            .enqueue(entity, OperationType::Delete, serde_json::json!({ "id": id }))
            .await?;
        self.after_write();
        Ok(existed)
    }

    async fn save_with<T: Serialize>(
        &self,
        entity: EntityType,
        id: &str,
        data: &T,
        operation: OperationType,
        priority: Priority,
    ) -> Result<StoredRecord> {
        // Durable before the intent is enqueued.
        let record = self.local.save(entity, id, data).await?;

        let payload = with_id(record.data.clone(), id);
        let item_id: QueueItemId = self
            .queue
            .enqueue_with_priority(entity, operation, payload, priority)
            .await?;

        tracing::debug!(%entity, id, item_id = %item_id, operation = %operation, "local write queued");
        self.after_write();
        Ok(record)
    }

    fn after_write(&self) {
        if self.config.push_on_write && self.network.is_online() && !self.cancel.is_cancelled() {
            self.queue.schedule_pass(Duration::ZERO);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(
        &self,
        entity: EntityType,
        id: &str,
    ) -> Result<Option<VersionedRecord<T>>> {
        Ok(self.local.get(entity, id).await?)
    }

    pub async fn get_all<T: DeserializeOwned>(
        &self,
        entity: EntityType,
    ) -> Result<Vec<VersionedRecord<T>>> {
        Ok(self.local.get_all(entity).await?)
    }
}

/// Make sure the payload names the entity it mutates.
fn with_id(mut payload: Value, id: &str) -> Value {
    if let Value::Object(map) = &mut payload {
        map.entry("id").or_insert_with(|| Value::from(id));
    }
    payload
}

async fn run_background<S, R, N>(
    orchestrator: Arc<SyncOrchestrator<S, R, N>>,
    queue: SyncQueue<S, R, N>,
    mut network: tokio::sync::watch::Receiver<bool>,
    period: Duration,
    cancel: CancellationToken,
) where
    S: Store + 'static,
    R: RemoteApi + 'static,
    N: NetworkMonitor + 'static,
{
    let mut online = *network.borrow_and_update();
    let mut ticker = if online {
        run_cycle(&*orchestrator).await;
        Some(new_ticker(period))
    } else {
        None
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = network.changed() => {
                if changed.is_err() {
                    tracing::debug!("network monitor dropped, background loop stopping");
                    break;
                }
                let now_online = *network.borrow_and_update();
                if now_online == online {
                    continue;
                }
                online = now_online;

                if online {
                    tracing::info!("back online, running sync cycle");
                    run_cycle(&*orchestrator).await;
                    ticker = Some(new_ticker(period));
                } else {
                    tracing::info!("offline, background sync paused");
                    ticker = None;
                    queue.cancel_scheduled();
                }
            }
            _ = tick(&mut ticker) => {
                run_cycle(&*orchestrator).await;
            }
        }
    }
}

async fn run_cycle<S, R, N>(orchestrator: &SyncOrchestrator<S, R, N>)
where
    S: Store + 'static,
    R: RemoteApi + 'static,
    N: NetworkMonitor + 'static,
{
    if let Err(e) = orchestrator.sync_cycle(false).await {
        tracing::error!(error = %e, "background sync cycle failed");
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
