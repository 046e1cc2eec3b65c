//! Audit logging for RBAC checks and mutations.
//!
//! Every permission check and every mutating operation produces an audit
//! event. Events flow through a bounded channel to a background task that
//! batch-writes them to the store; a full buffer or a failed write falls
//! back to tracing and a counter, never to the request path.
//!
//! ## Configuration
//!
//! - `MIRADOR_AUDIT_BUFFER_SIZE`: max events in buffer (default: 1024)
//! - `MIRADOR_AUDIT_FLUSH_INTERVAL_MS`: flush interval (default: 1000)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mirador_core::rbac::PermissionContext;
use mirador_store::{DynVectorBackend, SchemaBootstrap};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default buffer size for audit events.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default flush interval in milliseconds.
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// Batch size that triggers an immediate flush.
const FLUSH_BATCH_SIZE: usize = 100;

const AUDIT_CLASS: &str = "RbacAuditLog";

/// Outcome recorded on an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Allowed,
    Denied,
    Success,
    Error,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Allowed => "allowed",
            AuditResult::Denied => "denied",
            AuditResult::Success => "success",
            AuditResult::Error => "error",
        }
    }
}

/// Severity taxonomy: `low` for checks and system reads, `medium` for
/// role create/update and access denials, `high` for role deletes, role
/// assignments, and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// High-severity events are retained on the extended schedule.
    pub fn retention_class(&self) -> &'static str {
        match self {
            Severity::High => "extended",
            _ => "standard",
        }
    }
}

/// Synthetic correlation id for one audit event.
pub fn new_correlation_id() -> String {
    format!("rbac-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

/// One audit event, shaped like the stored `RbacAuditLog` properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub subject_id: String,
    pub subject_type: String,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub result: AuditResult,
    pub severity: Severity,
    pub source: String,
    pub correlation_id: String,
    pub retention_class: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl AuditEvent {
    fn base(
        tenant_id: &str,
        subject_id: &str,
        action: &str,
        resource: &str,
        result: AuditResult,
        severity: Severity,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            timestamp: Utc::now(),
            subject_id: subject_id.to_string(),
            subject_type: "user".to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id: String::new(),
            result,
            severity,
            source: "rbac".to_string(),
            correlation_id: new_correlation_id(),
            retention_class: severity.retention_class().to_string(),
            details: serde_json::Map::new(),
        }
    }

    /// Event for a permission check: `allowed` at low severity, `denied`
    /// at medium.
    pub fn check(ctx: &PermissionContext, allowed: bool) -> Self {
        let (result, severity) = if allowed {
            (AuditResult::Allowed, Severity::Low)
        } else {
            (AuditResult::Denied, Severity::Medium)
        };
        let mut event = Self::base(
            &ctx.tenant_id,
            &ctx.user_id,
            "rbac.check",
            &ctx.resource,
            result,
            severity,
        );
        event
            .details
            .insert("action".into(), ctx.action.clone().into());
        event
    }

    /// Event for a completed mutation.
    pub fn mutation(
        tenant_id: &str,
        actor: &str,
        action: &str,
        resource: &str,
        resource_id: &str,
        severity: Severity,
    ) -> Self {
        let mut event = Self::base(tenant_id, actor, action, resource, AuditResult::Success, severity);
        event.resource_id = resource_id.to_string();
        event
    }

    /// Event for a failed operation; always high severity.
    pub fn failure(tenant_id: &str, actor: &str, action: &str, resource: &str, error: &str) -> Self {
        let mut event = Self::base(
            tenant_id,
            actor,
            action,
            resource,
            AuditResult::Error,
            Severity::High,
        );
        event.details.insert("error".into(), error.into());
        event
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Runtime configuration for the audit pipeline.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub buffer_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: std::env::var("MIRADOR_AUDIT_BUFFER_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BUFFER_SIZE),
            flush_interval_ms: std::env::var("MIRADOR_AUDIT_FLUSH_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FLUSH_INTERVAL_MS),
        }
    }
}

/// Cheap-to-clone handle for emitting audit events.
///
/// Emission never blocks request processing: a full buffer drops the
/// event to tracing and bumps the fallback counter.
#[derive(Clone)]
pub struct AuditSink {
    sender: mpsc::Sender<AuditEvent>,
    fallbacks: Arc<AtomicU64>,
}

impl AuditSink {
    /// Create a sink and the receiver for [`audit_writer_task`].
    pub fn new(config: &AuditConfig) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(config.buffer_size);
        (
            Self {
                sender,
                fallbacks: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Sink whose events go nowhere but tracing; for tests and tools.
    pub fn disconnected() -> Self {
        let (sink, _receiver) = Self::new(&AuditConfig {
            buffer_size: 1,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        });
        sink
    }

    /// Emit an event (non-blocking).
    pub fn log(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %event.correlation_id,
                    action = %event.action,
                    "audit buffer full, event dropped to tracing"
                );
                log_event_as_fallback(&event, "buffer overflow");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                log_event_as_fallback(&event, "channel closed");
            }
        }
    }

    /// Events that never reached the writer.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

fn log_event_as_fallback(event: &AuditEvent, reason: &str) {
    info!(
        target: "audit_fallback",
        tenant_id = %event.tenant_id,
        subject_id = %event.subject_id,
        action = %event.action,
        resource = %event.resource,
        result = event.result.as_str(),
        severity = event.severity.as_str(),
        correlation_id = %event.correlation_id,
        reason,
        "audit event (fallback)"
    );
}

/// Background task that batch-writes audit events to the store.
pub async fn audit_writer_task(
    mut receiver: mpsc::Receiver<AuditEvent>,
    backend: Arc<DynVectorBackend>,
    bootstrap: Arc<SchemaBootstrap>,
    config: AuditConfig,
) {
    let flush_interval = std::time::Duration::from_millis(config.flush_interval_ms.max(10));
    let mut batch: Vec<AuditEvent> = Vec::with_capacity(FLUSH_BATCH_SIZE);
    let mut interval = tokio::time::interval(flush_interval);

    info!(
        buffer_size = config.buffer_size,
        flush_interval_ms = config.flush_interval_ms,
        "audit writer task started"
    );

    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Some(e) => {
                        batch.push(e);
                        if batch.len() >= FLUSH_BATCH_SIZE {
                            flush_batch(&mut batch, &backend, &bootstrap).await;
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            flush_batch(&mut batch, &backend, &bootstrap).await;
                        }
                        info!("audit writer task shutting down");
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                if !batch.is_empty() {
                    flush_batch(&mut batch, &backend, &bootstrap).await;
                }
            }
        }
    }
}

async fn flush_batch(
    batch: &mut Vec<AuditEvent>,
    backend: &Arc<DynVectorBackend>,
    bootstrap: &Arc<SchemaBootstrap>,
) {
    let events = std::mem::take(batch);
    let count = events.len();
    debug!(count, "flushing audit batch");

    if let Err(e) = bootstrap.ensure(backend.as_ref()).await {
        error!(error = %e, count, "schema bootstrap failed for audit batch");
        for event in &events {
            log_event_as_fallback(event, "bootstrap failure");
        }
        return;
    }

    for event in events {
        let properties = match serde_json::to_value(&event) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "audit event serialization failed");
                continue;
            }
        };
        if let Err(e) = backend
            .put_object(AUDIT_CLASS, Uuid::new_v4(), properties)
            .await
        {
            error!(
                error = %e,
                correlation_id = %event.correlation_id,
                "audit write failed"
            );
            log_event_as_fallback(&event, "store write failure");
        }
    }
}
