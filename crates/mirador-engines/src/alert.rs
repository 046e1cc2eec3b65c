//! Alert engine client: fracture analysis over the RPC channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirador_core::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DynamicConfig;
use crate::rpc::{GetHealthRequest, GetHealthResponse, RpcChannel};
use crate::{EngineError, EngineHandle, EngineResult, Environment, HealthStatus};

const ENGINE_NAME: &str = "alert";
const SERVICE: &str = "alert.v1.AlertEngine";

/// A detected breakage candidate in a service's telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fracture {
    pub id: String,
    pub service: String,
    pub metric: String,
    pub severity: String,
    pub score: f64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFracturesRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub services: Vec<String>,
    pub window_minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFracturesResponse {
    #[serde(default)]
    pub fractures: Vec<Fracture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFracturesRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFracturesResponse {
    #[serde(default)]
    pub fractures: Vec<Fracture>,
}

/// Capability interface for the Alert engine.
#[async_trait]
pub trait AlertEngine: Send + Sync {
    async fn analyze_fractures(
        &self,
        request: &AnalyzeFracturesRequest,
    ) -> EngineResult<AnalyzeFracturesResponse>;

    async fn get_fractures(
        &self,
        request: &GetFracturesRequest,
    ) -> EngineResult<GetFracturesResponse>;

    async fn health(&self) -> EngineResult<GetHealthResponse>;
}

/// RPC client for a live Alert engine.
pub struct AlertRpcClient {
    channel: RpcChannel,
}

impl AlertRpcClient {
    pub fn connect(endpoints: Vec<String>) -> EngineResult<Self> {
        Ok(Self {
            channel: RpcChannel::connect(endpoints)?,
        })
    }
}

#[async_trait]
impl AlertEngine for AlertRpcClient {
    async fn analyze_fractures(
        &self,
        request: &AnalyzeFracturesRequest,
    ) -> EngineResult<AnalyzeFracturesResponse> {
        self.channel
            .call(&format!("{SERVICE}/AnalyzeFractures"), request)
            .await
    }

    async fn get_fractures(
        &self,
        request: &GetFracturesRequest,
    ) -> EngineResult<GetFracturesResponse> {
        self.channel
            .call(&format!("{SERVICE}/GetFractures"), request)
            .await
    }

    async fn health(&self) -> EngineResult<GetHealthResponse> {
        self.channel
            .call(&format!("{SERVICE}/GetHealth"), &GetHealthRequest::default())
            .await
    }
}

/// No-op Alert client for development without a live engine.
pub struct NoopAlertEngine;

#[async_trait]
impl AlertEngine for NoopAlertEngine {
    async fn analyze_fractures(
        &self,
        request: &AnalyzeFracturesRequest,
    ) -> EngineResult<AnalyzeFracturesResponse> {
        warn!(tenant_id = %request.tenant_id, "alert engine not configured; analyze is a no-op");
        Err(EngineError::Unavailable("alert engine not configured".into()))
    }

    async fn get_fractures(
        &self,
        request: &GetFracturesRequest,
    ) -> EngineResult<GetFracturesResponse> {
        warn!(tenant_id = %request.tenant_id, "alert engine not configured; returning no fractures");
        Ok(GetFracturesResponse::default())
    }

    async fn health(&self) -> EngineResult<GetHealthResponse> {
        warn!("alert engine not configured; reporting healthy no-op");
        Ok(GetHealthResponse {
            status: "healthy".into(),
            version: "noop".into(),
        })
    }
}

/// Hot-reconfigurable holder for the active Alert client.
pub struct AlertManager {
    handle: EngineHandle<dyn AlertEngine>,
    config: Arc<dyn DynamicConfig>,
}

impl AlertManager {
    pub fn new(
        endpoints: &[String],
        environment: Environment,
        config: Arc<dyn DynamicConfig>,
    ) -> EngineResult<Self> {
        let client: Arc<dyn AlertEngine> = if endpoints.is_empty() {
            if environment == Environment::Production {
                return Err(EngineError::Unavailable(
                    "alert endpoints are required in production".into(),
                ));
            }
            warn!("no alert endpoints configured; using no-op client");
            Arc::new(NoopAlertEngine)
        } else {
            Arc::new(AlertRpcClient::connect(endpoints.to_vec())?)
        };
        Ok(Self {
            handle: EngineHandle::new(client),
            config,
        })
    }

    pub fn client(&self) -> Arc<dyn AlertEngine> {
        self.handle.get()
    }

    /// Persist a new endpoint and redial. RPC clients cannot retarget in
    /// place, so the channel is rebuilt; in-flight calls keep the old one.
    pub async fn update_endpoint(&self, tenant_id: &str, endpoint: &str) -> Result<()> {
        self.config
            .store_endpoint(tenant_id, ENGINE_NAME, endpoint)
            .await?;
        let client = AlertRpcClient::connect(vec![endpoint.to_string()])
            .map_err(mirador_core::CoreError::from)?;
        self.handle.swap(Arc::new(client));
        Ok(())
    }

    pub async fn health(&self) -> HealthStatus {
        match self.client().health().await {
            Ok(resp) if resp.is_healthy() => HealthStatus::healthy(ENGINE_NAME),
            Ok(resp) => HealthStatus::unhealthy(ENGINE_NAME, resp.status),
            Err(err) => HealthStatus::unhealthy(ENGINE_NAME, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn analyze_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alert.v1.AlertEngine/AnalyzeFractures"))
            .and(body_partial_json(serde_json::json!({"tenantId": "t1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fractures": [{
                    "id": "f1",
                    "service": "checkout",
                    "metric": "error_rate",
                    "severity": "critical",
                    "score": 0.93,
                    "detectedAt": "2026-03-04T12:00:00Z"
                }]
            })))
            .mount(&server)
            .await;

        let client = AlertRpcClient::connect(vec![server.uri()]).unwrap();
        let resp = client
            .analyze_fractures(&AnalyzeFracturesRequest {
                tenant_id: "t1".into(),
                services: vec!["checkout".into()],
                window_minutes: 30,
            })
            .await
            .unwrap();
        assert_eq!(resp.fractures.len(), 1);
        assert_eq!(resp.fractures[0].severity, "critical");
    }

    #[tokio::test]
    async fn health_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alert.v1.AlertEngine/GetHealth"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "healthy", "version": "1.4.2"})),
            )
            .mount(&server)
            .await;

        let client = AlertRpcClient::connect(vec![server.uri()]).unwrap();
        assert!(client.health().await.unwrap().is_healthy());
    }

    #[tokio::test]
    async fn noop_analyze_errors_and_reads_are_empty() {
        let noop = NoopAlertEngine;
        let analyze = noop
            .analyze_fractures(&AnalyzeFracturesRequest {
                tenant_id: "t1".into(),
                services: vec![],
                window_minutes: 5,
            })
            .await;
        assert!(matches!(analyze.unwrap_err(), EngineError::Unavailable(_)));

        let fractures = noop
            .get_fractures(&GetFracturesRequest {
                tenant_id: "t1".into(),
                service: String::new(),
                limit: 10,
            })
            .await
            .unwrap();
        assert!(fractures.fractures.is_empty());
    }
}
