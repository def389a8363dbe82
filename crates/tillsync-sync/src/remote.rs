//! Remote API abstraction.
//!
//! The backend exposes one REST resource per entity type with create,
//! update, delete and list endpoints. Implementations classify failures into
//! [`RemoteError`] variants; the queue relies on that classification.

use async_trait::async_trait;
use serde_json::Value;

use tillsync_core::EntityType;

use crate::error::RemoteError;

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote backend collaborator.
///
/// Successful mutations return the server's canonical copy of the entity,
/// already unwrapped from any `{ "data": ... }` envelope.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `POST /{resource}`
    async fn create(&self, entity: EntityType, payload: &Value) -> RemoteResult<Value>;

    /// `PUT /{resource}/{id}`
    async fn update(&self, entity: EntityType, id: &str, payload: &Value) -> RemoteResult<Value>;

    /// `DELETE /{resource}/{id}`
    async fn delete(&self, entity: EntityType, id: &str) -> RemoteResult<()>;

    /// `GET /{resource}`: the full collection.
    async fn fetch_all(&self, entity: EntityType) -> RemoteResult<Vec<Value>>;
}

/// A scriptable in-memory backend for testing.
///
/// Keeps one collection per entity type, records every call, and can be told
/// to fail upcoming calls.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;

    /// Kind of remote call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RemoteOp {
        Create,
        Update,
        Delete,
        FetchAll,
    }

    /// One observed call.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RemoteCall {
        pub op: RemoteOp,
        pub entity: EntityType,
        pub id: Option<String>,
    }

    type CallHook = Arc<dyn Fn(&RemoteCall) + Send + Sync>;

    #[derive(Default)]
    struct Inner {
        collections: HashMap<EntityType, BTreeMap<String, Value>>,
        /// Failures consumed one per mutation call, in order.
        scripted: VecDeque<RemoteError>,
        /// Persistent fetch failures per entity type.
        fetch_failures: HashMap<EntityType, RemoteError>,
        calls: Vec<RemoteCall>,
        revision: u64,
    }

    /// In-memory remote implementation.
    #[derive(Default)]
    pub struct MemoryRemote {
        inner: Mutex<Inner>,
        latency: Option<Duration>,
        on_call: Mutex<Option<CallHook>>,
    }

    impl MemoryRemote {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every call by `latency` before it is handled.
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        fn lock(&self) -> MutexGuard<'_, Inner> {
            // Test double: a poisoned lock still holds usable state.
            self.inner.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Put entities into a collection as if other clients created them.
        pub fn seed(&self, entity: EntityType, items: impl IntoIterator<Item = Value>) {
            let mut inner = self.lock();
            let collection = inner.collections.entry(entity).or_default();
            for item in items {
                if let Some(id) = value_id(&item) {
                    collection.insert(id, item);
                }
            }
        }

        /// Current server-side state of a collection, ordered by id.
        pub fn entities(&self, entity: EntityType) -> Vec<Value> {
            self.lock()
                .collections
                .get(&entity)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default()
        }

        pub fn entity(&self, entity: EntityType, id: &str) -> Option<Value> {
            self.lock()
                .collections
                .get(&entity)
                .and_then(|c| c.get(id))
                .cloned()
        }

        /// Fail the next mutation call with `error`.
        pub fn push_failure(&self, error: RemoteError) {
            self.lock().scripted.push_back(error);
        }

        /// Fail the next `times` mutation calls with `error`.
        pub fn fail_times(&self, times: usize, error: RemoteError) {
            let mut inner = self.lock();
            for _ in 0..times {
                inner.scripted.push_back(error.clone());
            }
        }

        /// Make `fetch_all` for `entity` fail until cleared with `None`.
        pub fn set_fetch_failure(&self, entity: EntityType, error: Option<RemoteError>) {
            let mut inner = self.lock();
            match error {
                Some(error) => inner.fetch_failures.insert(entity, error),
                None => inner.fetch_failures.remove(&entity),
            };
        }

        /// Run `hook` on every call, before the call is handled.
        pub fn set_on_call(&self, hook: impl Fn(&RemoteCall) + Send + Sync + 'static) {
            *self.on_call.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
        }

        pub fn calls(&self) -> Vec<RemoteCall> {
            self.lock().calls.clone()
        }

        pub fn call_count(&self) -> usize {
            self.lock().calls.len()
        }

        /// Number of mutation calls (everything but `fetch_all`).
        pub fn mutation_count(&self) -> usize {
            self.lock()
                .calls
                .iter()
                .filter(|c| c.op != RemoteOp::FetchAll)
                .count()
        }

        async fn begin(&self, call: RemoteCall) {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let hook = self
                .on_call
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(hook) = hook {
                hook(&call);
            }
            self.lock().calls.push(call);
        }

        fn stamp(inner: &mut Inner, mut value: Value) -> Value {
            inner.revision += 1;
            if let Value::Object(map) = &mut value {
                map.insert("revision".into(), Value::from(inner.revision));
            }
            value
        }
    }

    fn value_id(value: &Value) -> Option<String> {
        match value.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[async_trait]
    impl RemoteApi for MemoryRemote {
        async fn create(&self, entity: EntityType, payload: &Value) -> RemoteResult<Value> {
            self.begin(RemoteCall {
                op: RemoteOp::Create,
                entity,
                id: value_id(payload),
            })
            .await;

            let mut inner = self.lock();
            if let Some(error) = inner.scripted.pop_front() {
                return Err(error);
            }

            let mut value = payload.clone();
            let id = match value_id(&value) {
                Some(id) => id,
                None => {
                    let id = format!("srv-{}", inner.revision + 1);
                    if let Value::Object(map) = &mut value {
                        map.insert("id".into(), Value::from(id.clone()));
                    }
                    id
                }
            };
            let value = Self::stamp(&mut inner, value);
            inner
                .collections
                .entry(entity)
                .or_default()
                .insert(id, value.clone());
            Ok(value)
        }

        async fn update(
            &self,
            entity: EntityType,
            id: &str,
            payload: &Value,
        ) -> RemoteResult<Value> {
            self.begin(RemoteCall {
                op: RemoteOp::Update,
                entity,
                id: Some(id.to_string()),
            })
            .await;

            let mut inner = self.lock();
            if let Some(error) = inner.scripted.pop_front() {
                return Err(error);
            }

            let exists = inner
                .collections
                .get(&entity)
                .map_or(false, |c| c.contains_key(id));
            if !exists {
                return Err(RemoteError::application(404, format!("{} {} not found", entity, id)));
            }

            let value = Self::stamp(&mut inner, payload.clone());
            inner
                .collections
                .entry(entity)
                .or_default()
                .insert(id.to_string(), value.clone());
            Ok(value)
        }

        async fn delete(&self, entity: EntityType, id: &str) -> RemoteResult<()> {
            self.begin(RemoteCall {
                op: RemoteOp::Delete,
                entity,
                id: Some(id.to_string()),
            })
            .await;

            let mut inner = self.lock();
            if let Some(error) = inner.scripted.pop_front() {
                return Err(error);
            }

            let removed = inner
                .collections
                .get_mut(&entity)
                .and_then(|c| c.remove(id));
            match removed {
                Some(_) => Ok(()),
                None => Err(RemoteError::application(404, format!("{} {} not found", entity, id))),
            }
        }

        async fn fetch_all(&self, entity: EntityType) -> RemoteResult<Vec<Value>> {
            self.begin(RemoteCall {
                op: RemoteOp::FetchAll,
                entity,
                id: None,
            })
            .await;

            let inner = self.lock();
            if let Some(error) = inner.fetch_failures.get(&entity) {
                return Err(error.clone());
            }
            Ok(inner
                .collections
                .get(&entity)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default())
        }
    }
}
