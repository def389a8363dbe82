//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use tillsync_core::{EntityType, OperationType, Priority, QueueItem, SyncStatus};

pub fn entity_type() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

pub fn operation_type() -> impl Strategy<Value = OperationType> {
    prop_oneof![
        Just(OperationType::Create),
        Just(OperationType::Update),
        Just(OperationType::Delete),
    ]
}

pub fn priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::High), Just(Priority::Medium), Just(Priority::Low)]
}

pub fn sync_status() -> impl Strategy<Value = SyncStatus> {
    prop::sample::select(SyncStatus::ALL.to_vec())
}

/// Entity ids: short, printable, never empty.
pub fn entity_id() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,15}"
}

/// A JSON scalar. Floats are quarter steps, exact in binary, so they parse
/// back to the same value.
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-4_000_000i32..4_000_000).prop_map(|n| Value::from(f64::from(n) / 4.0)),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
}

/// An arbitrary JSON value, nested a few levels deep.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,12}", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// An entity payload: an object carrying `id` plus random fields.
pub fn entity_data() -> impl Strategy<Value = (String, Value)> {
    (
        entity_id(),
        prop::collection::btree_map("[a-zA-Z_]{1,12}", json_value(), 0..6),
    )
        .prop_map(|(id, fields)| {
            let mut map: Map<String, Value> = fields.into_iter().collect();
            map.insert("id".to_string(), Value::String(id.clone()));
            (id, Value::Object(map))
        })
}

/// A fresh PENDING queue item.
pub fn queue_item() -> impl Strategy<Value = QueueItem> {
    (entity_type(), operation_type(), priority(), entity_data())
        .prop_map(|(entity, op, priority, (_, payload))| {
            QueueItem::new(entity, op, payload, priority)
        })
}
