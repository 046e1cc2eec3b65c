//! RPC channel for the Alert and Predict engines.
//!
//! Protobuf-style request/response messages travel as JSON over POSTs to
//! gRPC-shaped method paths. The channel rotates round-robin across its
//! endpoints, dials with a 5s timeout, and retries transient failures
//! with exponential backoff (base 200ms, x1.6, 20% jitter, capped at 3s).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{EngineError, EngineResult};

/// Dial timeout for new connections.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect/retry backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            multiplier: 1.6,
            jitter: 0.2,
            max: Duration::from_secs(3),
        }
    }
}

/// Health message pair shared by the RPC engines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetHealthRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: String,
}

impl GetHealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Round-robin, retrying JSON-RPC channel.
pub struct RpcChannel {
    endpoints: Vec<String>,
    next: AtomicUsize,
    http: reqwest::Client,
    backoff: BackoffConfig,
    call_timeout: Duration,
    max_attempts: usize,
}

impl RpcChannel {
    /// Build a channel over one or more endpoints.
    pub fn connect(endpoints: Vec<String>) -> EngineResult<Self> {
        if endpoints.is_empty() {
            return Err(EngineError::Unavailable("no rpc endpoints configured".into()));
        }
        let endpoints: Vec<String> = endpoints
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .collect();
        let http = reqwest::Client::builder()
            .connect_timeout(DIAL_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let max_attempts = endpoints.len().max(3);
        Ok(Self {
            endpoints,
            next: AtomicUsize::new(0),
            http,
            backoff: BackoffConfig::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_attempts,
        })
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Invoke one method, e.g. `"alert.v1.AlertService/AnalyzeFractures"`.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> EngineResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut last_error = EngineError::Unavailable("no attempts made".into());
        for attempt in 0..self.max_attempts {
            let endpoint = self.next_endpoint();
            let url = format!("{endpoint}/{method}");
            debug!(url = %url, attempt, "rpc call");

            match self
                .http
                .post(&url)
                .timeout(self.call_timeout)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Resp>()
                            .await
                            .map_err(|e| EngineError::Decode(e.to_string()));
                    }
                    let message = resp.text().await.unwrap_or_default();
                    if status.is_server_error() {
                        last_error = EngineError::Status {
                            status: status.as_u16(),
                            message,
                        };
                    } else {
                        // Client errors are not retryable.
                        return Err(EngineError::Status {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(err) => last_error = EngineError::Transport(err.to_string()),
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.backoff_delay(attempt as u32);
                warn!(
                    method,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "rpc attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error)
    }

    fn next_endpoint(&self) -> &str {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[idx]
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff.base.as_secs_f64() * self.backoff.multiplier.powi(attempt as i32);
        let capped = exp.min(self.backoff.max.as_secs_f64());
        let jitter = rand::thread_rng()
            .gen_range(1.0 - self.backoff.jitter..=1.0 + self.backoff.jitter);
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }
}
