//! Cascaded KPI deletion across the vector store, the cache, and the
//! search-index metadata.
//!
//! The vector store is the source of truth and goes first; if its delete
//! fails the other stores are not touched. Cache and index deletions are
//! best-effort: their failures are recorded in the outcome but never fail
//! the operation.

use std::sync::Arc;

use mirador_core::catalog::KpiDefinition;
use mirador_core::ids::deterministic_id;
use mirador_store::{DynMetadataCache, DynVectorBackend, QuerySpec};
use serde::Serialize;
use tracing::{debug, warn};

use crate::entity::CatalogEntity;

/// Result of one store's participation in a cascaded delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreOutcome {
    pub found: bool,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-store outcomes of one cascaded delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteOutcome {
    pub vector: StoreOutcome,
    pub cache: StoreOutcome,
    pub index: StoreOutcome,
}

impl DeleteOutcome {
    /// The call succeeds iff the authoritative store did not fail.
    pub fn succeeded(&self) -> bool {
        self.vector.error.is_none()
    }
}

/// Coordinates deletion of a KPI across the three stores that may hold it.
pub struct DeleteOrchestrator {
    backend: Arc<DynVectorBackend>,
    cache: Arc<DynMetadataCache>,
    index: Arc<DynMetadataCache>,
}

impl DeleteOrchestrator {
    pub fn new(
        backend: Arc<DynVectorBackend>,
        cache: Arc<DynMetadataCache>,
        index: Arc<DynMetadataCache>,
    ) -> Self {
        Self {
            backend,
            cache,
            index,
        }
    }

    /// Delete a KPI everywhere it may live. Never returns an error; the
    /// outcome carries per-store results, and only an authoritative-store
    /// failure marks the call failed.
    pub async fn delete_kpi(&self, tenant_id: &str, kpi_id: &str) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();

        // 1. Vector store: authoritative. Not-found is success; a failed
        //    delete aborts the cascade.
        outcome.vector = self.delete_from_vector(tenant_id, kpi_id).await;
        if outcome.vector.error.is_some() {
            warn!(
                tenant_id,
                kpi_id,
                error = ?outcome.vector.error,
                "authoritative delete failed; skipping derived stores"
            );
            return outcome;
        }

        // 2. Cache: best-effort over the known key patterns.
        outcome.cache = delete_keys(
            self.cache.as_ref(),
            &[format!("kpi:def:{kpi_id}"), format!("kpi:{kpi_id}")],
        )
        .await;

        // 3. Search-index metadata: same best-effort pattern.
        outcome.index =
            delete_keys(self.index.as_ref(), &[format!("bleve:index:{kpi_id}")]).await;

        debug!(tenant_id, kpi_id, ?outcome, "cascaded delete finished");
        outcome
    }

    async fn delete_from_vector(&self, tenant_id: &str, kpi_id: &str) -> StoreOutcome {
        let mut result = StoreOutcome::default();

        let lookup = QuerySpec::new(KpiDefinition::CLASS)
            .fields(["kpiId"])
            .where_text("tenantId", tenant_id)
            .where_text("kpiId", kpi_id)
            .limit(1);
        match self.backend.query(&lookup).await {
            Ok(rows) => result.found = !rows.is_empty(),
            Err(err) if mirador_store::is_missing_class(&err) => {
                // No class means no object; success.
                return result;
            }
            Err(err) => {
                result.error = Some(err.to_string());
                return result;
            }
        }
        if !result.found {
            return result;
        }

        let id = deterministic_id(KpiDefinition::CLASS, tenant_id, &[kpi_id]);
        match self.backend.delete_object(KpiDefinition::CLASS, id).await {
            Ok(existed) => {
                result.deleted = existed;
                result.found = existed;
            }
            Err(err) => result.error = Some(err.to_string()),
        }
        result
    }
}

/// Best-effort lookup + delete for a set of cache keys. Failures are
/// recorded but non-fatal.
async fn delete_keys(cache: &DynMetadataCache, keys: &[String]) -> StoreOutcome {
    let mut result = StoreOutcome::default();
    for key in keys {
        match cache.get(key).await {
            Ok(Some(_)) => result.found = true,
            Ok(None) => {}
            Err(err) => {
                warn!(key, error = %err, "cache lookup failed during cascade");
                result.error.get_or_insert_with(|| err.to_string());
            }
        }
        match cache.delete(key).await {
            Ok(true) => result.deleted = true,
            Ok(false) => {}
            Err(err) => {
                warn!(key, error = %err, "cache delete failed during cascade");
                result.error.get_or_insert_with(|| err.to_string());
            }
        }
    }
    result
}
