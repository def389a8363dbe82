//! Dispatch table: which remote call a queue item turns into.
//!
//! Every `(EntityType, OperationType)` pair is spelled out so adding an
//! entity or operation fails to compile until its route is decided.

use serde_json::Value;

use tillsync_core::{EntityType, OperationType, QueueItem};

use crate::error::RemoteError;
use crate::remote::{RemoteApi, RemoteResult};

/// Remote call for one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `POST /{resource}`
    Create,
    /// `PUT /{resource}/{id}`
    Update,
    /// `DELETE /{resource}/{id}`
    Delete,
}

/// Look up the route for a pair.
pub fn route(entity: EntityType, operation: OperationType) -> Route {
    use EntityType::*;
    use OperationType::*;

    match (entity, operation) {
        (Product, Create) => Route::Create,
        (Product, Update) => Route::Update,
        (Product, Delete) => Route::Delete,

        (Contact, Create) => Route::Create,
        (Contact, Update) => Route::Update,
        (Contact, Delete) => Route::Delete,

        (Sale, Create) => Route::Create,
        (Sale, Update) => Route::Update,
        (Sale, Delete) => Route::Delete,

        (BusinessSetting, Create) => Route::Create,
        (BusinessSetting, Update) => Route::Update,
        (BusinessSetting, Delete) => Route::Delete,
    }
}

/// What a successful dispatch did remotely.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// The remote holds `data` as the canonical copy of `id`.
    Upserted { id: String, data: Value },
    /// The entity is gone remotely.
    Deleted { id: String },
}

/// Send one queue item to the remote.
///
/// A DELETE answered with 404 counts as success: the entity is already gone.
/// The returned id is the local id from the payload when there is one, so
/// the write-back lands on the record the user created.
pub async fn dispatch<R>(remote: &R, item: &QueueItem) -> RemoteResult<Dispatched>
where
    R: RemoteApi + ?Sized,
{
    let entity = item.entity_type;
    let local_id = item.entity_id();

    match route(entity, item.operation_type) {
        Route::Create => {
            let data = remote.create(entity, &item.payload).await?;
            let id = local_id
                .or_else(|| response_id(&data))
                .ok_or_else(|| missing_id("create response"))?;
            Ok(Dispatched::Upserted { id, data })
        }
        Route::Update => {
            let id = local_id.ok_or_else(|| missing_id("update payload"))?;
            let data = remote.update(entity, &id, &item.payload).await?;
            Ok(Dispatched::Upserted { id, data })
        }
        Route::Delete => {
            let id = local_id.ok_or_else(|| missing_id("delete payload"))?;
            match remote.delete(entity, &id).await {
                Ok(()) => Ok(Dispatched::Deleted { id }),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(%entity, id = %id, "delete of missing entity treated as done");
                    Ok(Dispatched::Deleted { id })
                }
                Err(e) => Err(e),
            }
        }
    }
}

fn response_id(data: &Value) -> Option<String> {
    match data.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn missing_id(what: &str) -> RemoteError {
    RemoteError::Application {
        status: None,
        message: format!("{} has no entity id", what),
    }
}
