//! KPI definition and dashboard routes.

use axum::extract::{Extension, Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use mirador_catalog::KpiPage;
use mirador_core::catalog::{
    Dashboard, KpiDefinition, KpiLayout, KpiQuery, KpiSparkline, KpiThreshold, Visibility,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::handlers::UpsertResponse;
use crate::metrics::record_catalog_operation;
use crate::state::AppState;
use crate::tenant::TenantId;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/kpi/defs", post(upsert_kpi).get(list_kpis))
        .route("/api/v1/kpi/defs/{id}", get(get_kpi).delete(delete_kpi))
        .route(
            "/api/v1/dashboards",
            post(upsert_dashboard).get(list_dashboards),
        )
        .route(
            "/api/v1/dashboards/{id}",
            get(get_dashboard).delete(delete_dashboard),
        )
        .route(
            "/api/v1/dashboards/{id}/layouts",
            get(list_layouts).put(put_layout),
        )
}

fn default_author() -> String {
    "unknown".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertKpiRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub query: KpiQuery,
    #[serde(default)]
    pub thresholds: Vec<KpiThreshold>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sparkline: KpiSparkline,
    #[serde(default)]
    pub owner_user_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default = "default_author")]
    pub author: String,
}

#[derive(Debug, Serialize)]
pub struct UpsertKpiResponse {
    pub status: &'static str,
    pub id: String,
    pub version: i64,
}

async fn upsert_kpi(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpsertKpiRequest>,
) -> ApiResult<Json<UpsertKpiResponse>> {
    let id = body
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Preserve the creation time across re-upserts.
    let created_at = match state
        .catalog
        .get::<KpiDefinition>(&tenant.0, &[&id])
        .await
    {
        Ok(existing) => existing.created_at,
        Err(_) => Utc::now(),
    };

    let kpi = KpiDefinition {
        tenant_id: tenant.0,
        id: id.clone(),
        kind: body.kind,
        name: body.name,
        unit: body.unit,
        format: body.format,
        query: body.query,
        thresholds: body.thresholds,
        tags: body.tags,
        sparkline: body.sparkline,
        owner_user_id: body.owner_user_id,
        visibility: body.visibility,
        version: 1,
        created_at,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(kpi, &body.author).await;
    record_catalog_operation("kpi.upsert", result.is_ok());
    Ok(Json(UpsertKpiResponse {
        status: "ok",
        id,
        version: result?,
    }))
}

/// Pagination and tag filters come from the raw query string because
/// `tag` may repeat.
fn parse_list_query(raw: Option<&str>) -> (usize, usize, Vec<String>) {
    let mut limit = 50usize;
    let mut offset = 0usize;
    let mut tags = Vec::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "limit" => limit = value.parse().unwrap_or(limit),
                "offset" => offset = value.parse().unwrap_or(offset),
                "tag" => {
                    if !value.is_empty() {
                        tags.push(value.into_owned());
                    }
                }
                _ => {}
            }
        }
    }
    (limit, offset, tags)
}

async fn list_kpis(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<KpiPage>> {
    let (limit, offset, tags) = parse_list_query(raw.as_deref());
    Ok(Json(
        state.catalog.list_kpis(&tenant.0, limit, offset, &tags).await?,
    ))
}

async fn get_kpi(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Json<KpiDefinition>> {
    Ok(Json(state.catalog.get(&tenant.0, &[&id]).await?))
}

/// Cascaded delete: per-store outcomes, 200 iff the authoritative store
/// succeeded.
async fn delete_kpi(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> Response {
    let outcome = state.deleter.delete_kpi(&tenant.0, &id).await;
    record_catalog_operation("kpi.delete", outcome.succeeded());
    let status = if outcome.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertDashboardRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub owner_user_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_author")]
    pub author: String,
}

async fn upsert_dashboard(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Json(body): Json<UpsertDashboardRequest>,
) -> ApiResult<Json<UpsertKpiResponse>> {
    let id = body
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let created_at = match state.catalog.get::<Dashboard>(&tenant.0, &[&id]).await {
        Ok(existing) => existing.created_at,
        Err(_) => Utc::now(),
    };

    let dashboard = Dashboard {
        tenant_id: tenant.0,
        id: id.clone(),
        name: body.name,
        owner_user_id: body.owner_user_id,
        visibility: body.visibility,
        is_default: body.is_default,
        version: 1,
        created_at,
        updated_at: Utc::now(),
    };
    let result = state.catalog.upsert(dashboard, &body.author).await;
    record_catalog_operation("dashboard.upsert", result.is_ok());
    Ok(Json(UpsertKpiResponse {
        status: "ok",
        id,
        version: result?,
    }))
}

async fn list_dashboards(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
) -> ApiResult<Json<Vec<Dashboard>>> {
    Ok(Json(state.catalog.list(&tenant.0, &[], 1000).await?))
}

async fn get_dashboard(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Dashboard>> {
    Ok(Json(state.catalog.get(&tenant.0, &[&id]).await?))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub found: bool,
}

async fn delete_dashboard(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let found = state.catalog.delete::<Dashboard>(&tenant.0, &[&id]).await?;
    record_catalog_operation("dashboard.delete", true);
    Ok(Json(DeleteResponse {
        status: "ok",
        found,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLayoutRequest {
    pub kpi_id: String,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

async fn put_layout(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(dashboard_id): Path<String>,
    Json(body): Json<PutLayoutRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let layout = KpiLayout {
        tenant_id: tenant.0,
        dashboard_id,
        kpi_id: body.kpi_id,
        x: body.x,
        y: body.y,
        w: body.w,
        h: body.h,
    };
    state.catalog.put_layout(&layout).await?;
    record_catalog_operation("layout.put", true);
    Ok(Json(UpsertResponse::ok(1)))
}

async fn list_layouts(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(dashboard_id): Path<String>,
) -> ApiResult<Json<Vec<KpiLayout>>> {
    Ok(Json(
        state
            .catalog
            .layouts_for_dashboard(&tenant.0, &dashboard_id)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_parses_repeated_tags() {
        let (limit, offset, tags) =
            parse_list_query(Some("limit=25&offset=50&tag=slo&tag=checkout"));
        assert_eq!(limit, 25);
        assert_eq!(offset, 50);
        assert_eq!(tags, vec!["slo", "checkout"]);
    }

    #[test]
    fn list_query_defaults() {
        let (limit, offset, tags) = parse_list_query(None);
        assert_eq!(limit, 50);
        assert_eq!(offset, 0);
        assert!(tags.is_empty());

        let (limit, _, _) = parse_list_query(Some("limit=notanumber"));
        assert_eq!(limit, 50);
    }
}
