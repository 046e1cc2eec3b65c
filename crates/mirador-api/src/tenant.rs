//! Request-context middleware: tenant resolution and request ids.
//!
//! Tenant identity arrives in the `X-Tenant-ID` header and is attached to
//! request extensions under [`TenantId`]; tenant-scoped routes reject
//! requests without it. Every request gets a v4 [`RequestId`].

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// Header carrying the tenant identity.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

/// Header carrying the acting user for RBAC checks and audit.
pub const USER_ID_HEADER: &str = "X-User-ID";

/// Resolved tenant identity, attached to request extensions.
#[derive(Debug, Clone)]
pub struct TenantId(pub String);

/// Per-request correlation id.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Attach a request id to every request.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4().to_string());
    req.extensions_mut().insert(id);
    next.run(req).await
}

/// Resolve the tenant header or reject with a validation error.
pub async fn require_tenant_middleware(mut req: Request, next: Next) -> Response {
    let tenant = req
        .headers()
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    match tenant {
        Some(tenant_id) => {
            debug!(tenant_id = %tenant_id, "tenant resolved from header");
            req.extensions_mut().insert(TenantId(tenant_id));
            next.run(req).await
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "field": "tenant_id",
                    "message": format!("missing {TENANT_ID_HEADER} header"),
                }
            })),
        )
            .into_response(),
    }
}

/// Acting user from the `X-User-ID` header; "anonymous" when absent.
pub fn actor_from(req_headers: &axum::http::HeaderMap) -> String {
    req_headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}
