//! Prometheus metrics for the control-plane API.
//!
//! Cache failures and audit fallbacks are the contractual "counted, never
//! surfaced" signals; the gauges mirror the live counters on scrape.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};
use std::time::Instant;

use crate::state::AppState;

lazy_static! {
    /// Counter for HTTP requests by method, path, and status.
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mirador_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// Histogram for request latency in seconds.
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "mirador_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    /// Counter for catalog operations by kind and outcome.
    pub static ref CATALOG_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "mirador_catalog_operations_total",
        "Catalog operations by kind and outcome",
        &["operation", "status"]
    )
    .unwrap();

    /// RBAC read-through cache counters, mirrored from CacheStats.
    pub static ref RBAC_CACHE_HITS: IntGauge = register_int_gauge!(
        "mirador_rbac_cache_hits",
        "RBAC cache hits since process start"
    )
    .unwrap();

    pub static ref RBAC_CACHE_MISSES: IntGauge = register_int_gauge!(
        "mirador_rbac_cache_misses",
        "RBAC cache misses since process start"
    )
    .unwrap();

    pub static ref RBAC_CACHE_FAILURES: IntGauge = register_int_gauge!(
        "mirador_rbac_cache_failures",
        "RBAC cache failures since process start (swallowed)"
    )
    .unwrap();

    /// Audit events that fell back to tracing instead of the store.
    pub static ref AUDIT_FALLBACKS: IntGauge = register_int_gauge!(
        "mirador_audit_fallbacks",
        "Audit events dropped to the tracing fallback"
    )
    .unwrap();
}

/// Record one catalog operation outcome.
pub fn record_catalog_operation(operation: &str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    CATALOG_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Middleware that times requests and counts them by matched route.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed().as_secs_f64();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(elapsed);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();

    response
}

/// `/metrics` endpoint: refresh mirrored gauges and render the registry.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    RBAC_CACHE_HITS.set(state.cache_stats.hits() as i64);
    RBAC_CACHE_MISSES.set(state.cache_stats.misses() as i64);
    RBAC_CACHE_FAILURES.set(state.cache_stats.failures() as i64);
    AUDIT_FALLBACKS.set(state.audit.fallback_count() as i64);

    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "metrics encoding failed");
        return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
