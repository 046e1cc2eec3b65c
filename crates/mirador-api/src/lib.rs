//! Mirador API
//!
//! HTTP surface of the control plane: schema catalog routes, KPI and
//! dashboard routes, RBAC administration, the permission-check endpoint,
//! engine reconfiguration, and the health/readiness/metrics probes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod state;
pub mod tenant;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full router.
///
/// Tenant-scoped routes sit behind the tenant-resolution middleware;
/// global RBAC administration and the probes do not.
pub fn build_router(state: AppState) -> Router {
    let tenant_scoped = Router::new()
        .merge(handlers::schema::router())
        .merge(handlers::kpi::router())
        .merge(handlers::rbac::tenant_router())
        .merge(handlers::system::engine_router())
        .layer(middleware::from_fn(tenant::require_tenant_middleware));

    Router::new()
        .route("/health", get(handlers::system::health))
        .route("/ready", get(handlers::system::ready))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(tenant_scoped)
        .merge(handlers::rbac::global_router())
        .layer(middleware::from_fn(metrics::track_metrics))
        .layer(middleware::from_fn(tenant::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
