//! Mirador Engines
//!
//! Clients for the external ML engines: RCA (REST), Alert and Predict
//! (RPC). Each engine has a capability trait with a real client and a
//! no-op implementation; a hot-swappable handle lets `update_endpoint`
//! replace the client at runtime while in-flight calls finish against the
//! old one.

pub mod alert;
pub mod config;
pub mod predict;
pub mod rca;
pub mod rpc;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

pub use alert::{AlertEngine, AlertManager, AlertRpcClient, NoopAlertEngine};
pub use config::{CacheDynamicConfig, DynamicConfig};
pub use predict::{NoopPredictEngine, PredictEngine, PredictManager, PredictRpcClient};
pub use rca::{NoopRcaEngine, RcaEngine, RcaHttpClient, RcaManager};
pub use rpc::RpcChannel;

/// Errors from engine clients.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine is not configured or deliberately no-op'd.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("engine returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("engine unhealthy: {0}")]
    Unhealthy(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for EngineError {
    fn from(err: reqwest_middleware::Error) -> Self {
        EngineError::Transport(err.to_string())
    }
}

impl From<EngineError> for mirador_core::CoreError {
    fn from(err: EngineError) -> Self {
        mirador_core::CoreError::EngineUnavailable(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Deployment environment; controls whether a missing engine endpoint
/// degrades to a no-op client or refuses to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_str_or_default(value: &str) -> Self {
        match value {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// Readiness-probe result for one engine.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub engine: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthStatus {
    pub fn healthy(engine: &'static str) -> Self {
        Self {
            engine,
            healthy: true,
            detail: None,
        }
    }

    pub fn unhealthy(engine: &'static str, detail: impl Into<String>) -> Self {
        Self {
            engine,
            healthy: false,
            detail: Some(detail.into()),
        }
    }
}

/// Hot-swappable client handle.
///
/// `get` clones the current `Arc`, so calls in flight during a swap keep
/// using the client they started with.
pub struct EngineHandle<T: ?Sized> {
    inner: RwLock<Arc<T>>,
}

impl<T: ?Sized> EngineHandle<T> {
    pub fn new(client: Arc<T>) -> Self {
        Self {
            inner: RwLock::new(client),
        }
    }

    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.inner.read())
    }

    pub fn swap(&self, client: Arc<T>) {
        *self.inner.write() = client;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing() {
        assert_eq!(
            Environment::from_str_or_default("production"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_or_default("prod"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_or_default("development"),
            Environment::Development
        );
        assert_eq!(Environment::from_str_or_default(""), Environment::Development);
    }

    #[test]
    fn handle_swap_preserves_old_arc() {
        let handle = EngineHandle::new(Arc::new(1u32));
        let before = handle.get();
        handle.swap(Arc::new(2u32));
        assert_eq!(*before, 1);
        assert_eq!(*handle.get(), 2);
    }
}
