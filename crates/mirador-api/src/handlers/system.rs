//! Health, readiness, and engine reconfiguration routes.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::{Json, Router};
use mirador_core::CoreError;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::tenant::TenantId;

pub fn engine_router() -> Router<AppState> {
    Router::new().route("/api/v1/engines/{engine}/endpoint", put(update_endpoint))
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness probe: the store must answer; engine health is reported but
/// only degrades the status.
pub async fn ready(State(state): State<AppState>) -> Response {
    if let Err(err) = state.backend.ready().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unready", "error": err.to_string()})),
        )
            .into_response();
    }

    let engines = vec![
        state.rca.health().await,
        state.alert.health().await,
        state.predict.health().await,
    ];
    let status = if engines.iter().all(|e| e.healthy) {
        "ready"
    } else {
        "degraded"
    };
    (
        StatusCode::OK,
        Json(json!({"status": status, "engines": engines})),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateEndpointRequest {
    pub endpoint: String,
}

/// Hot engine reconfiguration: persist the endpoint, then swap the
/// in-memory client. In-flight calls finish against the old endpoint.
async fn update_endpoint(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(engine): Path<String>,
    Json(body): Json<UpdateEndpointRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.endpoint.trim().is_empty() {
        return Err(CoreError::validation("endpoint", "endpoint is required").into());
    }
    match engine.as_str() {
        "rca" => state.rca.update_endpoint(&tenant.0, &body.endpoint).await?,
        "alert" => state.alert.update_endpoint(&tenant.0, &body.endpoint).await?,
        "predict" => {
            state
                .predict
                .update_endpoint(&tenant.0, &body.endpoint)
                .await?
        }
        other => {
            return Err(CoreError::validation(
                "engine",
                format!("unknown engine '{other}' (expected rca, alert, or predict)"),
            )
            .into())
        }
    }
    Ok(Json(json!({"status": "ok", "engine": engine})))
}
