//! Vector-store backend seam and the HTTP implementation.
//!
//! The control plane assumes a REST+GraphQL object store:
//! `GET /v1/.well-known/ready`, `GET`/`POST /v1/schema`,
//! `PUT`/`DELETE /v1/objects/{id}`, `POST /v1/graphql`. Implementations
//! handle different mechanisms; [`HttpVectorStore`] speaks that wire
//! protocol, [`crate::MemoryStore`] backs development and tests.

use std::time::Duration;

use async_trait::async_trait;
use mirador_core::{CoreError, Result};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::query::QuerySpec;
use crate::schema::ClassDefinition;

/// Default per-call timeout against the store.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Backend abstraction for the canonical object store.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Liveness/readiness of the store itself.
    async fn ready(&self) -> Result<()>;

    /// Names of all classes currently in the schema.
    async fn list_classes(&self) -> Result<Vec<String>>;

    /// Create a class if it does not already exist. Idempotent.
    async fn ensure_class(&self, def: &ClassDefinition) -> Result<()>;

    /// Upsert an object by id, replacing all properties.
    async fn put_object(&self, class: &str, id: Uuid, properties: Value) -> Result<()>;

    /// Delete an object by id. Returns whether it existed.
    async fn delete_object(&self, class: &str, id: Uuid) -> Result<bool>;

    /// Run a structured query, returning raw property maps.
    async fn query(&self, spec: &QuerySpec) -> Result<Vec<Value>>;

    /// Exact match count for a query, or `None` when the backend cannot
    /// aggregate.
    async fn count(&self, spec: &QuerySpec) -> Result<Option<i64>>;
}

/// Trait-object alias used across engine state.
pub type DynVectorBackend = dyn VectorBackend;

/// REST+GraphQL client for the vector store.
#[derive(Debug, Clone)]
pub struct HttpVectorStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpVectorStore {
    /// Create a client for the store at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }

    /// Attach a bearer API key to every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn graphql(&self, query: &str) -> Result<Value> {
        let resp = self
            .request(reqwest::Method::POST, "/v1/graphql")
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| CoreError::Store(format!("graphql request failed: {e}")))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| CoreError::Store(format!("graphql response decode failed: {e}")))?;

        if !status.is_success() {
            return Err(CoreError::Store(format!(
                "graphql request returned {status}: {body}"
            )));
        }
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect();
                return Err(CoreError::Store(messages.join("; ")));
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl VectorBackend for HttpVectorStore {
    async fn ready(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "/v1/.well-known/ready")
            .send()
            .await
            .map_err(|e| CoreError::Store(format!("readiness probe failed: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CoreError::Store(format!(
                "store not ready: {}",
                resp.status()
            )))
        }
    }

    async fn list_classes(&self) -> Result<Vec<String>> {
        let resp = self
            .request(reqwest::Method::GET, "/v1/schema")
            .send()
            .await
            .map_err(|e| CoreError::Store(format!("schema list failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(CoreError::Store(format!(
                "schema list returned {}",
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| CoreError::Store(format!("schema list decode failed: {e}")))?;
        let classes = body
            .get("classes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| c.get("class").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(classes)
    }

    async fn ensure_class(&self, def: &ClassDefinition) -> Result<()> {
        let properties: Vec<Value> = def
            .properties
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "dataType": [p.data_type],
                })
            })
            .collect();
        let body = json!({
            "class": def.class,
            "description": def.description,
            "properties": properties,
        });

        let resp = self
            .request(reqwest::Method::POST, "/v1/schema")
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Store(format!("class create failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        // Racing creators are fine; the class exists either way.
        if status.as_u16() == 422 && text.contains("already exists") {
            return Ok(());
        }
        Err(CoreError::Store(format!(
            "class create for '{}' returned {status}: {text}",
            def.class
        )))
    }

    async fn put_object(&self, class: &str, id: Uuid, properties: Value) -> Result<()> {
        let body = json!({
            "class": class,
            "id": id.to_string(),
            "properties": properties,
        });
        let resp = self
            .request(reqwest::Method::PUT, &format!("/v1/objects/{id}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Store(format!("object put failed: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(CoreError::Store(format!(
            "object put for {class}/{id} returned {status}: {text}"
        )))
    }

    async fn delete_object(&self, _class: &str, id: Uuid) -> Result<bool> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/v1/objects/{id}"))
            .send()
            .await
            .map_err(|e| CoreError::Store(format!("object delete failed: {e}")))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if status.is_success() {
            return Ok(true);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(CoreError::Store(format!(
            "object delete for {id} returned {status}: {text}"
        )))
    }

    async fn query(&self, spec: &QuerySpec) -> Result<Vec<Value>> {
        let body = self.graphql(&spec.compile()).await?;
        let rows = body
            .pointer(&format!("/data/Get/{}", spec.class))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(rows)
    }

    async fn count(&self, spec: &QuerySpec) -> Result<Option<i64>> {
        let body = self.graphql(&spec.compile_count()).await?;
        let count = body
            .pointer(&format!("/data/Aggregate/{}/0/meta/count", spec.class))
            .and_then(Value::as_i64);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::class_definitions;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(uri: &str) -> HttpVectorStore {
        HttpVectorStore::new(uri)
            .with_api_key("test-key")
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn ready_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/.well-known/ready"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        store(&server.uri()).ready().await.unwrap();
    }

    #[tokio::test]
    async fn list_classes_parses_schema() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schema"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "classes": [{"class": "Metric"}, {"class": "MetricVersion"}]
            })))
            .mount(&server)
            .await;

        let classes = store(&server.uri()).list_classes().await.unwrap();
        assert_eq!(classes, vec!["Metric", "MetricVersion"]);
    }

    #[tokio::test]
    async fn ensure_class_tolerates_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/schema"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("class \"Metric\" already exists"),
            )
            .mount(&server)
            .await;

        let defs = class_definitions();
        store(&server.uri()).ensure_class(&defs[0]).await.unwrap();
    }

    #[tokio::test]
    async fn put_object_sends_class_and_id() {
        let server = MockServer::start().await;
        let id = Uuid::nil();
        Mock::given(method("PUT"))
            .and(path(format!("/v1/objects/{id}")))
            .and(body_partial_json(serde_json::json!({"class": "Metric"})))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        store(&server.uri())
            .put_object("Metric", id, serde_json::json!({"name": "cpu"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_object_maps_404_to_not_found() {
        let server = MockServer::start().await;
        let id = Uuid::nil();
        Mock::given(method("DELETE"))
            .and(path(format!("/v1/objects/{id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let found = store(&server.uri()).delete_object("Metric", id).await.unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn query_unwraps_get_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"Get": {"Metric": [{"name": "cpu_usage", "version": 2}]}}
            })))
            .mount(&server)
            .await;

        let rows = store(&server.uri())
            .query(&QuerySpec::new("Metric").fields(["name", "version"]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "cpu_usage");
    }

    #[tokio::test]
    async fn query_surfaces_graphql_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{"message": "Cannot query field \"Metric\" on type \"GetObjectsObj\""}]
            })))
            .mount(&server)
            .await;

        let err = store(&server.uri())
            .query(&QuerySpec::new("Metric").fields(["name"]))
            .await
            .unwrap_err();
        assert!(crate::is_missing_class(&err));
    }

    #[tokio::test]
    async fn count_reads_aggregate_meta() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"Aggregate": {"KpiDefinition": [{"meta": {"count": 42}}]}}
            })))
            .mount(&server)
            .await;

        let count = store(&server.uri())
            .count(&QuerySpec::new("KpiDefinition"))
            .await
            .unwrap();
        assert_eq!(count, Some(42));
    }
}
