//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use serde_json::{json, Value};

use tillsync::{Engine, EngineConfig};
use tillsync_store::MemoryStore;
use tillsync_sync::{ManualNetworkMonitor, MemoryRemote, QueueConfig};

/// Engine over in-memory collaborators.
pub type MemoryEngine = Engine<MemoryStore, MemoryRemote, ManualNetworkMonitor>;

/// An engine plus handles to every collaborator it was built from.
pub struct TestHarness {
    pub engine: MemoryEngine,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<MemoryRemote>,
    pub network: Arc<ManualNetworkMonitor>,
}

impl TestHarness {
    /// Online harness with [`deterministic_config`].
    pub fn online() -> Self {
        Self::with_config(true, deterministic_config())
    }

    /// Offline harness with [`deterministic_config`].
    pub fn offline() -> Self {
        Self::with_config(false, deterministic_config())
    }

    pub fn with_config(online: bool, config: EngineConfig) -> Self {
        Self::with_remote(online, MemoryRemote::new(), config)
    }

    pub fn with_remote(online: bool, remote: MemoryRemote, config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(remote);
        let network = Arc::new(ManualNetworkMonitor::new(online));
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::clone(&network),
            config,
        );
        Self {
            engine,
            store,
            remote,
            network,
        }
    }
}

/// Config with no implicit passes: nothing is pushed unless the test asks.
pub fn deterministic_config() -> EngineConfig {
    EngineConfig::default()
        .with_push_on_write(false)
        .with_queue(QueueConfig::default().with_schedule_retries(false))
}

pub fn product(id: &str, name: &str, price_cents: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "sku": format!("SKU-{}", id),
        "priceCents": price_cents,
        "category": "general",
    })
}

pub fn contact(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": format!("{}@example.com", id),
        "type": "customer",
    })
}

/// A sale with one line per `(product_id, quantity, unit_cents)`.
pub fn sale(id: &str, lines: &[(&str, i64, i64)]) -> Value {
    let items: Vec<Value> = lines
        .iter()
        .map(|(product_id, quantity, unit_cents)| {
            json!({
                "productId": product_id,
                "quantity": quantity,
                "unitCents": unit_cents,
            })
        })
        .collect();
    let total: i64 = lines.iter().map(|(_, q, u)| q * u).sum();
    json!({
        "id": id,
        "items": items,
        "totalCents": total,
        "paymentMethod": "cash",
    })
}

pub fn setting(key: &str, value: Value) -> Value {
    json!({ "key": key, "value": value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tillsync_core::EntityType;

    #[test]
    fn test_sale_total() {
        let s = sale("s1", &[("p1", 2, 350), ("p2", 1, 100)]);
        assert_eq!(s["totalCents"], json!(800));
        assert_eq!(s["items"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_harness_offline_save() {
        let harness = TestHarness::offline();
        harness
            .engine
            .save(EntityType::Product, "p1", &product("p1", "Coffee", 350))
            .await
            .unwrap();

        assert_eq!(harness.remote.call_count(), 0);
        let stats = harness.engine.queue().get_queue_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }
}
