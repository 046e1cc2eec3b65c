//! Schema catalog routes: metrics, labels, log fields, trace services,
//! and trace operations, each with version history.

use std::collections::HashMap;

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use mirador_core::catalog::{Label, LogField, Metric, TraceOperation, TraceService, VersionInfo};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::handlers::UpsertResponse;
use crate::metrics::record_catalog_operation;
use crate::state::AppState;
use crate::tenant::TenantId;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/schema/metrics", post(upsert_metric))
        .route("/api/v1/schema/metrics/{metric}", get(get_metric))
        .route(
            "/api/v1/schema/metrics/{metric}/versions",
            get(list_metric_versions),
        )
        .route(
            "/api/v1/schema/metrics/{metric}/versions/{version}",
            get(get_metric_version),
        )
        .route(
            "/api/v1/schema/metrics/{metric}/labels",
            get(get_metric_labels),
        )
        .route("/api/v1/schema/labels", post(upsert_label))
        .route("/api/v1/schema/labels/{name}", get(get_label))
        .route(
            "/api/v1/schema/labels/{name}/versions",
            get(list_label_versions),
        )
        .route(
            "/api/v1/schema/labels/{name}/versions/{version}",
            get(get_label_version),
        )
        .route("/api/v1/schema/logs/fields", post(upsert_log_field))
        .route("/api/v1/schema/logs/fields/{field}", get(get_log_field))
        .route(
            "/api/v1/schema/logs/fields/{field}/versions",
            get(list_log_field_versions),
        )
        .route(
            "/api/v1/schema/logs/fields/{field}/versions/{version}",
            get(get_log_field_version),
        )
        .route("/api/v1/schema/traces/services", post(upsert_trace_service))
        .route("/api/v1/schema/traces/services/{svc}", get(get_trace_service))
        .route(
            "/api/v1/schema/traces/services/{svc}/versions",
            get(list_trace_service_versions),
        )
        .route(
            "/api/v1/schema/traces/services/{svc}/versions/{version}",
            get(get_trace_service_version),
        )
        .route(
            "/api/v1/schema/traces/services/{svc}/operations",
            post(upsert_trace_operation).get(list_trace_operations),
        )
        .route(
            "/api/v1/schema/traces/services/{svc}/operations/{op}",
            get(get_trace_operation),
        )
        .route(
            "/api/v1/schema/traces/services/{svc}/operations/{op}/versions",
            get(list_trace_operation_versions),
        )
        .route(
            "/api/v1/schema/traces/services/{svc}/operations/{op}/versions/{version}",
            get(get_trace_operation_version),
        )
}

fn default_author() -> String {
    "unknown".to_string()
}

/// A version payload with its info row.
#[derive(Debug, Serialize)]
pub struct VersionedPayload<T> {
    pub version: VersionInfo,
    pub payload: T,
}

// ---------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMetricRequest {
    pub metric: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_author")]
    pub author: String,
}

async fn upsert_metric(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpsertMetricRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let metric = Metric {
        tenant_id: tenant.0,
        name: body.metric,
        description: body.description,
        owner: body.owner,
        tags: body.tags,
        category: body.category,
        sentiment: body.sentiment,
        unit: body.unit,
        source: body.source,
        version: 1,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(metric, &body.author).await;
    record_catalog_operation("metric.upsert", result.is_ok());
    Ok(Json(UpsertResponse::ok(result?)))
}

async fn get_metric(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(metric): Path<String>,
) -> ApiResult<Json<Metric>> {
    Ok(Json(state.catalog.get(&tenant.0, &[&metric]).await?))
}

async fn list_metric_versions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(metric): Path<String>,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    Ok(Json(
        state
            .catalog
            .list_versions::<Metric>(&tenant.0, &[&metric])
            .await?,
    ))
}

async fn get_metric_version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((metric, version)): Path<(String, i64)>,
) -> ApiResult<Json<VersionedPayload<Metric>>> {
    let (payload, info) = state
        .catalog
        .get_version(&tenant.0, &[&metric], version)
        .await?;
    Ok(Json(VersionedPayload {
        version: info,
        payload,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LabelNamesQuery {
    /// Comma-separated label names to restrict the lookup to.
    #[serde(default)]
    pub name: Option<String>,
}

async fn get_metric_labels(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(metric): Path<String>,
    Query(query): Query<LabelNamesQuery>,
) -> ApiResult<Json<HashMap<String, Label>>> {
    let names: Vec<String> = query
        .name
        .map(|n| n.split(',').map(str::trim).map(str::to_string).collect())
        .unwrap_or_default();
    Ok(Json(
        state
            .catalog
            .metric_label_defs(&tenant.0, &metric, &names)
            .await?,
    ))
}

// ---------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLabelRequest {
    pub name: String,
    /// Owning metric; empty for a tenant-global label.
    #[serde(default)]
    pub metric: String,
    #[serde(default, rename = "type")]
    pub label_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allowed_values: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default = "default_author")]
    pub author: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LabelScopeQuery {
    #[serde(default)]
    pub metric: Option<String>,
}

async fn upsert_label(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpsertLabelRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let label = Label {
        tenant_id: tenant.0,
        name: body.name,
        metric: body.metric,
        label_type: body.label_type,
        required: body.required,
        allowed_values: body.allowed_values,
        description: body.description,
        category: body.category,
        sentiment: body.sentiment,
        version: 1,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(label, &body.author).await;
    record_catalog_operation("label.upsert", result.is_ok());
    Ok(Json(UpsertResponse::ok(result?)))
}

async fn get_label(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(name): Path<String>,
    Query(scope): Query<LabelScopeQuery>,
) -> ApiResult<Json<Label>> {
    let metric = scope.metric.unwrap_or_default();
    Ok(Json(state.catalog.get(&tenant.0, &[&metric, &name]).await?))
}

async fn list_label_versions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(name): Path<String>,
    Query(scope): Query<LabelScopeQuery>,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    let metric = scope.metric.unwrap_or_default();
    Ok(Json(
        state
            .catalog
            .list_versions::<Label>(&tenant.0, &[&metric, &name])
            .await?,
    ))
}

async fn get_label_version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((name, version)): Path<(String, i64)>,
    Query(scope): Query<LabelScopeQuery>,
) -> ApiResult<Json<VersionedPayload<Label>>> {
    let metric = scope.metric.unwrap_or_default();
    let (payload, info) = state
        .catalog
        .get_version(&tenant.0, &[&metric, &name], version)
        .await?;
    Ok(Json(VersionedPayload {
        version: info,
        payload,
    }))
}

// ---------------------------------------------------------------------
// Log fields
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLogFieldRequest {
    pub field: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default = "default_author")]
    pub author: String,
}

async fn upsert_log_field(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpsertLogFieldRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let field = LogField {
        tenant_id: tenant.0,
        name: body.field,
        field_type: body.field_type,
        description: body.description,
        tags: body.tags,
        category: body.category,
        sentiment: body.sentiment,
        version: 1,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(field, &body.author).await;
    record_catalog_operation("log_field.upsert", result.is_ok());
    Ok(Json(UpsertResponse::ok(result?)))
}

async fn get_log_field(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(field): Path<String>,
) -> ApiResult<Json<LogField>> {
    Ok(Json(state.catalog.get(&tenant.0, &[&field]).await?))
}

async fn list_log_field_versions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(field): Path<String>,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    Ok(Json(
        state
            .catalog
            .list_versions::<LogField>(&tenant.0, &[&field])
            .await?,
    ))
}

async fn get_log_field_version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((field, version)): Path<(String, i64)>,
) -> ApiResult<Json<VersionedPayload<LogField>>> {
    let (payload, info) = state
        .catalog
        .get_version(&tenant.0, &[&field], version)
        .await?;
    Ok(Json(VersionedPayload {
        version: info,
        payload,
    }))
}

// ---------------------------------------------------------------------
// Trace services and operations
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTraceServiceRequest {
    pub service: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default = "default_author")]
    pub author: String,
}

async fn upsert_trace_service(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpsertTraceServiceRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let service = TraceService {
        tenant_id: tenant.0,
        name: body.service,
        purpose: body.purpose,
        owner: body.owner,
        tags: body.tags,
        category: body.category,
        sentiment: body.sentiment,
        version: 1,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(service, &body.author).await;
    record_catalog_operation("trace_service.upsert", result.is_ok());
    Ok(Json(UpsertResponse::ok(result?)))
}

async fn get_trace_service(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(svc): Path<String>,
) -> ApiResult<Json<TraceService>> {
    Ok(Json(state.catalog.get(&tenant.0, &[&svc]).await?))
}

async fn list_trace_service_versions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(svc): Path<String>,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    Ok(Json(
        state
            .catalog
            .list_versions::<TraceService>(&tenant.0, &[&svc])
            .await?,
    ))
}

async fn get_trace_service_version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((svc, version)): Path<(String, i64)>,
) -> ApiResult<Json<VersionedPayload<TraceService>>> {
    let (payload, info) = state
        .catalog
        .get_version(&tenant.0, &[&svc], version)
        .await?;
    Ok(Json(VersionedPayload {
        version: info,
        payload,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTraceOperationRequest {
    pub operation: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default = "default_author")]
    pub author: String,
}

async fn upsert_trace_operation(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(svc): Path<String>,
    Json(body): Json<UpsertTraceOperationRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let operation = TraceOperation {
        tenant_id: tenant.0,
        service: svc,
        name: body.operation,
        purpose: body.purpose,
        owner: body.owner,
        tags: body.tags,
        category: body.category,
        sentiment: body.sentiment,
        version: 1,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(operation, &body.author).await;
    record_catalog_operation("trace_operation.upsert", result.is_ok());
    Ok(Json(UpsertResponse::ok(result?)))
}

async fn list_trace_operations(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(svc): Path<String>,
) -> ApiResult<Json<Vec<TraceOperation>>> {
    Ok(Json(
        state
            .catalog
            .list(&tenant.0, &[("service", svc.as_str())], 1000)
            .await?,
    ))
}

async fn get_trace_operation(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((svc, op)): Path<(String, String)>,
) -> ApiResult<Json<TraceOperation>> {
    Ok(Json(state.catalog.get(&tenant.0, &[&svc, &op]).await?))
}

async fn list_trace_operation_versions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((svc, op)): Path<(String, String)>,
) -> ApiResult<Json<Vec<VersionInfo>>> {
    Ok(Json(
        state
            .catalog
            .list_versions::<TraceOperation>(&tenant.0, &[&svc, &op])
            .await?,
    ))
}

async fn get_trace_operation_version(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path((svc, op, version)): Path<(String, String, i64)>,
) -> ApiResult<Json<VersionedPayload<TraceOperation>>> {
    let (payload, info) = state
        .catalog
        .get_version(&tenant.0, &[&svc, &op], version)
        .await?;
    Ok(Json(VersionedPayload {
        version: info,
        payload,
    }))
}
