//! HTTP implementation of [`RemoteApi`].
//!
//! Talks to a REST backend with one resource per entity type. Requests carry
//! a bearer token from a [`CredentialProvider`]. Responses may be the entity
//! itself or an envelope `{ "data": ... }`; both are accepted.
//!
//! Failure classification:
//!
//! | Failure                                   | Classified as                |
//! |-------------------------------------------|------------------------------|
//! | connect / TLS / body read failure         | [`RemoteError::Network`]     |
//! | request exceeded the configured timeout   | [`RemoteError::Timeout`]     |
//! | any non-2xx status                        | [`RemoteError::Application`] |
//! | 2xx with an unparseable body              | [`RemoteError::Application`] |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;

use tillsync_core::EntityType;

use crate::error::{RemoteError, Result, SyncError};
use crate::remote::{RemoteApi, RemoteResult};

/// Longest server error body copied into an error message.
const MAX_ERROR_BODY: usize = 200;

/// Supplies the bearer credential for each request.
///
/// Token acquisition and refresh live outside the engine.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated.
    async fn bearer_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Configuration for the HTTP remote.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// REST backend client.
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRemoteApi {
    pub fn new(config: HttpConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build http client: {}", e)))?;

        tracing::debug!(base_url = %config.base_url, "http remote configured");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn collection_url(&self, entity: EntityType) -> String {
        format!("{}/{}", self.base_url, entity.resource())
    }

    fn item_url(&self, entity: EntityType, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, entity.resource(), id)
    }

    async fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.credentials.bearer_token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Option<Value>> {
        let response = builder.send().await.map_err(classify)?;
        read_response(response).await
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create(&self, entity: EntityType, payload: &Value) -> RemoteResult<Value> {
        let builder = self
            .request(Method::POST, self.collection_url(entity))
            .await
            .json(payload);
        let body = self.send(builder).await?;
        Ok(body.unwrap_or_else(|| payload.clone()))
    }

    async fn update(&self, entity: EntityType, id: &str, payload: &Value) -> RemoteResult<Value> {
        let builder = self
            .request(Method::PUT, self.item_url(entity, id))
            .await
            .json(payload);
        let body = self.send(builder).await?;
        Ok(body.unwrap_or_else(|| payload.clone()))
    }

    async fn delete(&self, entity: EntityType, id: &str) -> RemoteResult<()> {
        let builder = self.request(Method::DELETE, self.item_url(entity, id)).await;
        self.send(builder).await?;
        Ok(())
    }

    async fn fetch_all(&self, entity: EntityType) -> RemoteResult<Vec<Value>> {
        let builder = self.request(Method::GET, self.collection_url(entity)).await;
        match self.send(builder).await? {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(RemoteError::Application {
                status: None,
                message: format!("expected a list of {}, got {}", entity.resource(), kind_of(&other)),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Map a transport failure onto the network side of the taxonomy.
fn classify(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

async fn read_response(response: Response) -> RemoteResult<Option<Value>> {
    let status = response.status();
    let body = response.text().await.map_err(classify)?;

    if !status.is_success() {
        let fallback = status.canonical_reason().unwrap_or("request failed");
        return Err(RemoteError::application(
            status.as_u16(),
            error_message(&body, fallback),
        ));
    }

    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| RemoteError::Application {
        status: Some(status.as_u16()),
        message: format!("invalid response body: {}", e),
    })?;
    Ok(Some(unwrap_envelope(value)))
}

/// Accept both `T` and `{ "data": T }`.
///
/// An object is treated as an envelope only when it has a `data` key and no
/// `id` of its own, so entities with a `data` field pass through intact.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") && !map.contains_key("id") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Best-effort human message from an error body.
fn error_message(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let candidates = [
            value.get("message"),
            value.get("error").and_then(|e| e.get("message")),
            value.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(s) = candidate.as_str() {
                return s.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_BODY).collect()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(
            unwrap_envelope(json!({"data": {"id": "p1"}})),
            json!({"id": "p1"})
        );
        assert_eq!(unwrap_envelope(json!({"data": [1, 2]})), json!([1, 2]));
        // Bare entity with its own `data` field.
        let entity = json!({"id": "s1", "data": "receipt"});
        assert_eq!(unwrap_envelope(entity.clone()), entity);
        assert_eq!(unwrap_envelope(json!([1])), json!([1]));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message": "bad email"}"#, "x"), "bad email");
        assert_eq!(
            error_message(r#"{"error": {"message": "duplicate sku"}}"#, "x"),
            "duplicate sku"
        );
        assert_eq!(error_message(r#"{"error": "forbidden"}"#, "x"), "forbidden");
        assert_eq!(error_message("", "Bad Request"), "Bad Request");
        assert_eq!(error_message("upstream exploded", "x"), "upstream exploded");
        assert_eq!(error_message(&"e".repeat(500), "x").len(), MAX_ERROR_BODY);
    }

    #[test]
    fn test_urls() {
        let api = HttpRemoteApi::new(
            HttpConfig::new("https://pos.example.com/api/"),
            Arc::new(StaticToken("t".into())),
        )
        .unwrap();
        assert_eq!(
            api.collection_url(EntityType::BusinessSetting),
            "https://pos.example.com/api/business-settings"
        );
        assert_eq!(
            api.item_url(EntityType::Contact, "c1"),
            "https://pos.example.com/api/contacts/c1"
        );
    }
}
