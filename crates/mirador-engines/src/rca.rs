//! RCA engine client: JSON REST.
//!
//! Wire surface: `POST /api/v1/investigate`, `GET /api/v1/correlations`,
//! `GET /api/v1/patterns`, `POST /api/v1/feedback`, `GET /health`.
//! Calls get 30s, health gets 5s. The readiness probe treats the engine
//! as healthy iff `/health` answers `{"status": "healthy"}` in time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirador_core::Result;
use parking_lot::RwLock;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DynamicConfig;
use crate::{EngineError, EngineHandle, EngineResult, Environment, HealthStatus};

/// Timeout for investigate/list calls.
pub const RCA_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the health probe.
pub const RCA_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const ENGINE_NAME: &str = "rca";

/// A (service, metric, anomaly-score, threshold, timestamp, data-type)
/// tuple emitted by the RCA engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedAnchor {
    pub service: String,
    pub metric: String,
    pub anomaly_score: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub data_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigateIncidentRequest {
    pub tenant_id: String,
    pub incident_id: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub time_range: TimeRange,
    #[serde(default)]
    pub affected_services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investigation {
    pub incident_id: String,
    pub root_cause: String,
    pub confidence: f64,
    #[serde(default)]
    pub red_anchors: Vec<RedAnchor>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// A grouping of related anomalies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub anomalies: Vec<RedAnchor>,
    #[serde(default)]
    pub window: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub occurrences: i64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationFeedback {
    pub investigation_id: String,
    pub helpful: bool,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// Capability interface for the RCA engine.
#[async_trait]
pub trait RcaEngine: Send + Sync {
    async fn investigate_incident(
        &self,
        request: &InvestigateIncidentRequest,
    ) -> EngineResult<Investigation>;

    async fn list_correlations(
        &self,
        tenant_id: &str,
        range: &TimeRange,
    ) -> EngineResult<Vec<Correlation>>;

    async fn get_patterns(&self, tenant_id: &str) -> EngineResult<Vec<FailurePattern>>;

    async fn submit_feedback(&self, feedback: &InvestigationFeedback) -> EngineResult<()>;

    async fn health_check(&self) -> EngineResult<()>;
}

/// REST client for a live RCA engine.
pub struct RcaHttpClient {
    http: ClientWithMiddleware,
    base_url: RwLock<String>,
    call_timeout: Duration,
    health_timeout: Duration,
}

impl RcaHttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(3))
            .build_with_max_retries(2);
        let http = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            http,
            base_url: RwLock::new(base_url.into().trim_end_matches('/').to_string()),
            call_timeout: RCA_CALL_TIMEOUT,
            health_timeout: RCA_HEALTH_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    /// Point the client at a new engine endpoint. Calls already in
    /// flight read the URL once and are unaffected.
    pub fn set_base_url(&self, base_url: &str) {
        *self.base_url.write() = base_url.trim_end_matches('/').to_string();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.read())
    }

    async fn expect_success(resp: reqwest::Response) -> EngineResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(EngineError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RcaEngine for RcaHttpClient {
    async fn investigate_incident(
        &self,
        request: &InvestigateIncidentRequest,
    ) -> EngineResult<Investigation> {
        let resp = self
            .http
            .post(self.url("/api/v1/investigate"))
            .timeout(self.call_timeout)
            .json(request)
            .send()
            .await?;
        Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    async fn list_correlations(
        &self,
        tenant_id: &str,
        range: &TimeRange,
    ) -> EngineResult<Vec<Correlation>> {
        let resp = self
            .http
            .get(self.url("/api/v1/correlations"))
            .timeout(self.call_timeout)
            .query(&[
                ("tenant_id", tenant_id),
                ("start", &range.start.to_rfc3339()),
                ("end", &range.end.to_rfc3339()),
            ])
            .send()
            .await?;
        Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    async fn get_patterns(&self, tenant_id: &str) -> EngineResult<Vec<FailurePattern>> {
        let resp = self
            .http
            .get(self.url("/api/v1/patterns"))
            .timeout(self.call_timeout)
            .query(&[("tenant_id", tenant_id)])
            .send()
            .await?;
        Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    async fn submit_feedback(&self, feedback: &InvestigationFeedback) -> EngineResult<()> {
        let resp = self
            .http
            .post(self.url("/api/v1/feedback"))
            .timeout(self.call_timeout)
            .json(feedback)
            .send()
            .await?;
        Self::expect_success(resp).await.map(|_| ())
    }

    async fn health_check(&self) -> EngineResult<()> {
        let resp = self
            .http
            .get(self.url("/health"))
            .timeout(self.health_timeout)
            .send()
            .await?;
        let body: HealthBody = Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        if body.status == "healthy" {
            Ok(())
        } else {
            Err(EngineError::Unhealthy(body.status))
        }
    }
}

/// No-op RCA client for development without a live engine.
pub struct NoopRcaEngine;

#[async_trait]
impl RcaEngine for NoopRcaEngine {
    async fn investigate_incident(
        &self,
        request: &InvestigateIncidentRequest,
    ) -> EngineResult<Investigation> {
        warn!(incident_id = %request.incident_id, "rca engine not configured; investigate is a no-op");
        Err(EngineError::Unavailable("rca engine not configured".into()))
    }

    async fn list_correlations(
        &self,
        tenant_id: &str,
        _range: &TimeRange,
    ) -> EngineResult<Vec<Correlation>> {
        warn!(tenant_id, "rca engine not configured; returning no correlations");
        Ok(Vec::new())
    }

    async fn get_patterns(&self, tenant_id: &str) -> EngineResult<Vec<FailurePattern>> {
        warn!(tenant_id, "rca engine not configured; returning no patterns");
        Ok(Vec::new())
    }

    async fn submit_feedback(&self, feedback: &InvestigationFeedback) -> EngineResult<()> {
        warn!(
            investigation_id = %feedback.investigation_id,
            "rca engine not configured; feedback dropped"
        );
        Ok(())
    }

    async fn health_check(&self) -> EngineResult<()> {
        warn!("rca engine not configured; reporting healthy no-op");
        Ok(())
    }
}

/// Hot-reconfigurable holder for the active RCA client.
pub struct RcaManager {
    handle: EngineHandle<dyn RcaEngine>,
    config: Arc<dyn DynamicConfig>,
}

impl RcaManager {
    /// Build the manager. A missing endpoint degrades to the no-op
    /// client in development and is a startup error in production.
    pub fn new(
        endpoint: Option<&str>,
        environment: Environment,
        config: Arc<dyn DynamicConfig>,
    ) -> EngineResult<Self> {
        let client: Arc<dyn RcaEngine> = match endpoint {
            Some(endpoint) => Arc::new(RcaHttpClient::new(endpoint)),
            None if environment == Environment::Development => {
                warn!("no rca endpoint configured; using no-op client");
                Arc::new(NoopRcaEngine)
            }
            None => {
                return Err(EngineError::Unavailable(
                    "rca endpoint is required in production".into(),
                ))
            }
        };
        Ok(Self {
            handle: EngineHandle::new(client),
            config,
        })
    }

    pub fn client(&self) -> Arc<dyn RcaEngine> {
        self.handle.get()
    }

    /// Persist a new endpoint, then swap the live client. In-flight
    /// calls complete against the old endpoint.
    pub async fn update_endpoint(&self, tenant_id: &str, endpoint: &str) -> Result<()> {
        self.config
            .store_endpoint(tenant_id, ENGINE_NAME, endpoint)
            .await?;
        self.handle.swap(Arc::new(RcaHttpClient::new(endpoint)));
        Ok(())
    }

    pub async fn health(&self) -> HealthStatus {
        match self.client().health_check().await {
            Ok(()) => HealthStatus::healthy(ENGINE_NAME),
            Err(err) => HealthStatus::unhealthy(ENGINE_NAME, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheDynamicConfig;
    use mirador_store::MemoryCache;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn investigate_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/investigate"))
            .and(body_partial_json(serde_json::json!({"incidentId": "inc-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "incidentId": "inc-1",
                "rootCause": "connection pool exhaustion",
                "confidence": 0.87,
                "redAnchors": [{
                    "service": "checkout",
                    "metric": "db_connections",
                    "anomalyScore": 0.95,
                    "threshold": 0.8,
                    "timestamp": "2026-03-04T12:00:00Z",
                    "dataType": "metrics"
                }],
                "recommendations": ["increase pool size"]
            })))
            .mount(&server)
            .await;

        let client = RcaHttpClient::new(server.uri());
        let request = InvestigateIncidentRequest {
            tenant_id: "t1".into(),
            incident_id: "inc-1".into(),
            symptoms: vec!["latency".into()],
            time_range: TimeRange {
                start: Utc::now() - chrono::Duration::hours(1),
                end: Utc::now(),
            },
            affected_services: vec!["checkout".into()],
        };
        let investigation = client.investigate_incident(&request).await.unwrap();
        assert_eq!(investigation.root_cause, "connection pool exhaustion");
        assert_eq!(investigation.red_anchors.len(), 1);
        assert_eq!(investigation.red_anchors[0].service, "checkout");
    }

    #[tokio::test]
    async fn correlations_pass_tenant_and_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/correlations"))
            .and(query_param("tenant_id", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "c1", "score": 0.9, "anomalies": [], "window": "5m"}
            ])))
            .mount(&server)
            .await;

        let client = RcaHttpClient::new(server.uri());
        let range = TimeRange {
            start: Utc::now() - chrono::Duration::hours(1),
            end: Utc::now(),
        };
        let correlations = client.list_correlations("t1", &range).await.unwrap();
        assert_eq!(correlations.len(), 1);
        assert_eq!(correlations[0].id, "c1");
    }

    #[tokio::test]
    async fn health_requires_healthy_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "degraded"})),
            )
            .mount(&server)
            .await;

        let client = RcaHttpClient::new(server.uri());
        let err = client.health_check().await.unwrap_err();
        assert!(matches!(err, EngineError::Unhealthy(_)));
    }

    #[tokio::test]
    async fn noop_behavior() {
        let noop = NoopRcaEngine;
        let range = TimeRange {
            start: Utc::now(),
            end: Utc::now(),
        };
        assert!(noop.list_correlations("t1", &range).await.unwrap().is_empty());
        assert!(noop.get_patterns("t1").await.unwrap().is_empty());
        assert!(noop.health_check().await.is_ok());

        let request = InvestigateIncidentRequest {
            tenant_id: "t1".into(),
            incident_id: "inc-1".into(),
            symptoms: vec![],
            time_range: range,
            affected_services: vec![],
        };
        assert!(matches!(
            noop.investigate_incident(&request).await.unwrap_err(),
            EngineError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn manager_degrades_to_noop_in_development_only() {
        let config = Arc::new(CacheDynamicConfig::new(Arc::new(MemoryCache::new())));
        assert!(RcaManager::new(None, Environment::Development, config.clone()).is_ok());
        assert!(RcaManager::new(None, Environment::Production, config).is_err());
    }

    #[tokio::test]
    async fn update_endpoint_persists_and_swaps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "healthy"})),
            )
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCache::new());
        let config = Arc::new(CacheDynamicConfig::new(cache));
        let manager =
            RcaManager::new(None, Environment::Development, config.clone()).unwrap();

        manager.update_endpoint("t1", &server.uri()).await.unwrap();
        assert_eq!(
            config.load_endpoint("t1", "rca").await.unwrap(),
            Some(server.uri())
        );
        // The swapped-in client is the live HTTP client now.
        assert!(manager.health().await.healthy);
    }
}
