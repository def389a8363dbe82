//! SyncOrchestrator: one reconciliation cycle, push then pull.
//!
//! Push is a queue pass. Pull refreshes each reference kind that is past its
//! freshness threshold (or every kind, when forced). Kinds are pulled
//! independently: one failing does not stop the others, and a failed kind
//! keeps its old timestamp so the next cycle tries again.

use std::sync::Arc;

use serde_json::Value;

use tillsync_core::{now_millis, EntityType, ReferenceKind};
use tillsync_store::{LocalStore, Store};
use tillsync_sync::{NetworkMonitor, ProcessOutcome, RemoteApi, SyncQueue};

use crate::config::FreshnessConfig;
use crate::error::Result;

/// What happened to one reference kind during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The collection was replaced; `count` entities came from the remote.
    Refreshed { count: usize },
    /// Not due yet.
    Fresh,
    /// Skipped, no connectivity.
    Offline,
    /// The pull failed and will be retried next cycle.
    Failed { error: String },
}

/// Result of a full cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub push: ProcessOutcome,
    pub pulls: Vec<(ReferenceKind, PullOutcome)>,
}

impl SyncReport {
    pub fn pull(&self, kind: ReferenceKind) -> Option<&PullOutcome> {
        self.pulls.iter().find(|(k, _)| *k == kind).map(|(_, o)| o)
    }

    pub fn refreshed(&self) -> Vec<ReferenceKind> {
        self.pulls
            .iter()
            .filter(|(_, o)| matches!(o, PullOutcome::Refreshed { .. }))
            .map(|(k, _)| *k)
            .collect()
    }
}

/// Drives push and pull against one store and one remote.
pub struct SyncOrchestrator<S, R, N> {
    store: Arc<S>,
    local: LocalStore<S>,
    queue: SyncQueue<S, R, N>,
    remote: Arc<R>,
    network: Arc<N>,
    freshness: FreshnessConfig,
}

impl<S, R, N> SyncOrchestrator<S, R, N>
where
    S: Store + 'static,
    R: RemoteApi + 'static,
    N: NetworkMonitor + 'static,
{
    pub fn new(
        store: Arc<S>,
        queue: SyncQueue<S, R, N>,
        remote: Arc<R>,
        network: Arc<N>,
        freshness: FreshnessConfig,
    ) -> Self {
        Self {
            local: LocalStore::new(Arc::clone(&store)),
            store,
            queue,
            remote,
            network,
            freshness,
        }
    }

    pub fn freshness(&self) -> &FreshnessConfig {
        &self.freshness
    }

    /// Push, then pull every due kind (every kind if `force`).
    ///
    /// Storage failures during the push are returned. Pull failures are
    /// reported per kind in the [`SyncReport`].
    pub async fn sync_cycle(&self, force: bool) -> Result<SyncReport> {
        let push = self.push().await?;
        let pulls = self.pull(force).await;

        let report = SyncReport { push, pulls };
        tracing::debug!(refreshed = ?report.refreshed(), "sync cycle finished");
        Ok(report)
    }

    /// Drain the queue.
    pub async fn push(&self) -> Result<ProcessOutcome> {
        Ok(self.queue.process_queue().await?)
    }

    /// Pull every kind in turn.
    pub async fn pull(&self, force: bool) -> Vec<(ReferenceKind, PullOutcome)> {
        let mut pulls = Vec::with_capacity(ReferenceKind::ALL.len());
        for kind in ReferenceKind::ALL {
            pulls.push((kind, self.pull_kind(kind, force).await));
        }
        pulls
    }

    /// Whether `kind` is past its freshness threshold.
    pub async fn is_due(&self, kind: ReferenceKind) -> Result<bool> {
        let last_fetch = self.store.get_last_fetch(kind).await?;
        Ok(self.freshness.is_due(kind, last_fetch, now_millis()))
    }

    /// Pull one kind if due. Never fails: errors become
    /// [`PullOutcome::Failed`].
    pub async fn pull_kind(&self, kind: ReferenceKind, force: bool) -> PullOutcome {
        match self.try_pull_kind(kind, force).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "pull failed");
                PullOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_pull_kind(&self, kind: ReferenceKind, force: bool) -> Result<PullOutcome> {
        if !force && !self.is_due(kind).await? {
            return Ok(PullOutcome::Fresh);
        }
        if !self.network.is_online() {
            return Ok(PullOutcome::Offline);
        }

        let entity = kind.entity_type();
        let items = self.remote.fetch_all(entity).await?;
        let fetched_at = now_millis();

        let mut incoming = Vec::with_capacity(items.len());
        for item in items {
            match entity_key(entity, &item) {
                Some(id) => incoming.push((id, item)),
                None => tracing::warn!(%kind, "pulled entity without id skipped"),
            }
        }

        let count = self.local.replace_all(entity, incoming, fetched_at).await?;
        self.store.set_last_fetch(kind, fetched_at).await?;

        tracing::info!(%kind, count, "reference data refreshed");
        Ok(PullOutcome::Refreshed { count })
    }
}

/// The id a pulled entity is stored under. Settings may be keyed by `key`.
fn entity_key(entity: EntityType, value: &Value) -> Option<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    value.get("id").and_then(scalar).or_else(|| match entity {
        EntityType::BusinessSetting => value.get("key").and_then(scalar),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tillsync_store::MemoryStore;
    use tillsync_sync::{ManualNetworkMonitor, MemoryRemote, QueueConfig, RemoteError};

    type TestOrchestrator = SyncOrchestrator<MemoryStore, MemoryRemote, ManualNetworkMonitor>;

    const H: i64 = 60 * 60 * 1000;

    fn setup(online: bool) -> (TestOrchestrator, Arc<MemoryStore>, Arc<MemoryRemote>) {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let network = Arc::new(ManualNetworkMonitor::new(online));
        let queue = SyncQueue::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&network),
            QueueConfig::default().with_schedule_retries(false),
        );
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            queue,
            Arc::clone(&remote),
            network,
            FreshnessConfig::default(),
        );
        (orchestrator, store, remote)
    }

    #[test]
    fn test_entity_key() {
        assert_eq!(entity_key(EntityType::Product, &json!({"id": 7})), Some("7".into()));
        assert_eq!(
            entity_key(EntityType::BusinessSetting, &json!({"key": "currency"})),
            Some("currency".into())
        );
        assert_eq!(entity_key(EntityType::Product, &json!({"key": "x"})), None);
    }

    #[tokio::test]
    async fn test_first_cycle_pulls_everything() {
        let (orchestrator, _store, remote) = setup(true);
        remote.seed(EntityType::Product, vec![json!({"id": "p1"}), json!({"id": "p2"})]);
        remote.seed(EntityType::Contact, vec![json!({"id": "c1"})]);

        let report = orchestrator.sync_cycle(false).await.unwrap();
        assert_eq!(
            report.pull(ReferenceKind::Products),
            Some(&PullOutcome::Refreshed { count: 2 })
        );
        assert_eq!(
            report.pull(ReferenceKind::Contacts),
            Some(&PullOutcome::Refreshed { count: 1 })
        );
        assert_eq!(
            report.pull(ReferenceKind::Settings),
            Some(&PullOutcome::Refreshed { count: 0 })
        );

        // Second cycle: only settings are due.
        let report = orchestrator.sync_cycle(false).await.unwrap();
        assert_eq!(report.refreshed(), vec![ReferenceKind::Settings]);
    }

    #[tokio::test]
    async fn test_failure_in_one_kind_is_isolated() {
        let (orchestrator, store, remote) = setup(true);
        remote.seed(EntityType::Product, vec![json!({"id": "p1"})]);
        remote.set_fetch_failure(
            EntityType::Contact,
            Some(RemoteError::application(500, "contacts unavailable")),
        );

        let report = orchestrator.sync_cycle(false).await.unwrap();
        assert!(matches!(report.pull(ReferenceKind::Contacts), Some(PullOutcome::Failed { .. })));
        assert_eq!(
            report.pull(ReferenceKind::Products),
            Some(&PullOutcome::Refreshed { count: 1 })
        );
        assert!(matches!(
            report.pull(ReferenceKind::Settings),
            Some(PullOutcome::Refreshed { .. })
        ));

        // The failed kind keeps no timestamp and is retried next cycle.
        assert_eq!(store.get_last_fetch(ReferenceKind::Contacts).await.unwrap(), None);
        remote.set_fetch_failure(EntityType::Contact, None);
        let report = orchestrator.sync_cycle(false).await.unwrap();
        assert!(report.refreshed().contains(&ReferenceKind::Contacts));
    }

    #[tokio::test]
    async fn test_offline_pull_is_skipped() {
        let (orchestrator, _store, remote) = setup(false);
        let report = orchestrator.sync_cycle(true).await.unwrap();

        assert_eq!(report.push, ProcessOutcome::Offline);
        assert!(report.pulls.iter().all(|(_, o)| *o == PullOutcome::Offline));
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_force_ignores_freshness() {
        let (orchestrator, store, remote) = setup(true);
        store
            .set_last_fetch(ReferenceKind::Products, now_millis() - H)
            .await
            .unwrap();

        assert_eq!(
            orchestrator.pull_kind(ReferenceKind::Products, false).await,
            PullOutcome::Fresh
        );
        assert_eq!(remote.call_count(), 0);

        assert!(matches!(
            orchestrator.pull_kind(ReferenceKind::Products, true).await,
            PullOutcome::Refreshed { .. }
        ));
    }
}
