//! Predict engine client: incident prediction over the RPC channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirador_core::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DynamicConfig;
use crate::rpc::{GetHealthRequest, GetHealthResponse, RpcChannel};
use crate::{EngineError, EngineHandle, EngineResult, Environment, HealthStatus};

const ENGINE_NAME: &str = "predict";
const SERVICE: &str = "predict.v1.PredictEngine";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigateRequest {
    pub tenant_id: String,
    pub incident_id: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// A single failure prediction for a service metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub service: String,
    pub metric: String,
    pub probability: f64,
    pub horizon_minutes: i64,
    #[serde(default)]
    pub model_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigateResponse {
    pub incident_id: String,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

/// Capability interface for the Predict engine.
#[async_trait]
pub trait PredictEngine: Send + Sync {
    async fn investigate(&self, request: &InvestigateRequest) -> EngineResult<InvestigateResponse>;

    async fn get_health(&self) -> EngineResult<GetHealthResponse>;
}

/// RPC client for a live Predict engine.
pub struct PredictRpcClient {
    channel: RpcChannel,
}

impl PredictRpcClient {
    pub fn connect(endpoints: Vec<String>) -> EngineResult<Self> {
        Ok(Self {
            channel: RpcChannel::connect(endpoints)?,
        })
    }
}

#[async_trait]
impl PredictEngine for PredictRpcClient {
    async fn investigate(&self, request: &InvestigateRequest) -> EngineResult<InvestigateResponse> {
        self.channel
            .call(&format!("{SERVICE}/Investigate"), request)
            .await
    }

    async fn get_health(&self) -> EngineResult<GetHealthResponse> {
        self.channel
            .call(&format!("{SERVICE}/GetHealth"), &GetHealthRequest::default())
            .await
    }
}

/// No-op Predict client for development without a live engine.
pub struct NoopPredictEngine;

#[async_trait]
impl PredictEngine for NoopPredictEngine {
    async fn investigate(&self, request: &InvestigateRequest) -> EngineResult<InvestigateResponse> {
        warn!(
            tenant_id = %request.tenant_id,
            incident_id = %request.incident_id,
            "predict engine not configured; investigate is a no-op"
        );
        Err(EngineError::Unavailable(
            "predict engine not configured".into(),
        ))
    }

    async fn get_health(&self) -> EngineResult<GetHealthResponse> {
        warn!("predict engine not configured; reporting healthy no-op");
        Ok(GetHealthResponse {
            status: "healthy".into(),
            version: "noop".into(),
        })
    }
}

/// Hot-reconfigurable holder for the active Predict client.
pub struct PredictManager {
    handle: EngineHandle<dyn PredictEngine>,
    config: Arc<dyn DynamicConfig>,
}

impl PredictManager {
    pub fn new(
        endpoints: &[String],
        environment: Environment,
        config: Arc<dyn DynamicConfig>,
    ) -> EngineResult<Self> {
        let client: Arc<dyn PredictEngine> = if endpoints.is_empty() {
            if environment == Environment::Production {
                return Err(EngineError::Unavailable(
                    "predict endpoints are required in production".into(),
                ));
            }
            warn!("no predict endpoints configured; using no-op client");
            Arc::new(NoopPredictEngine)
        } else {
            Arc::new(PredictRpcClient::connect(endpoints.to_vec())?)
        };
        Ok(Self {
            handle: EngineHandle::new(client),
            config,
        })
    }

    pub fn client(&self) -> Arc<dyn PredictEngine> {
        self.handle.get()
    }

    /// Persist a new endpoint and redial the channel.
    pub async fn update_endpoint(&self, tenant_id: &str, endpoint: &str) -> Result<()> {
        self.config
            .store_endpoint(tenant_id, ENGINE_NAME, endpoint)
            .await?;
        let client = PredictRpcClient::connect(vec![endpoint.to_string()])
            .map_err(mirador_core::CoreError::from)?;
        self.handle.swap(Arc::new(client));
        Ok(())
    }

    pub async fn health(&self) -> HealthStatus {
        match self.client().get_health().await {
            Ok(resp) if resp.is_healthy() => HealthStatus::healthy(ENGINE_NAME),
            Ok(resp) => HealthStatus::unhealthy(ENGINE_NAME, resp.status),
            Err(err) => HealthStatus::unhealthy(ENGINE_NAME, err.to_string()),
        }
    }
}
