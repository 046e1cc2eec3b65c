//! KPI-specific catalog operations: paginated listing with tag filters,
//! dashboard layouts, and per-metric label lookups.

use std::collections::HashMap;

use mirador_core::catalog::{KpiDefinition, KpiLayout, Label};
use mirador_core::ids::deterministic_id;
use mirador_core::validation::validate_tenant_id;
use mirador_core::Result;
use mirador_store::QuerySpec;

use crate::engine::CatalogEngine;
use crate::entity::CatalogEntity;

/// Default and maximum page sizes for KPI listings.
pub const DEFAULT_KPI_PAGE: usize = 50;
pub const MAX_KPI_PAGE: usize = 500;

const LAYOUT_CLASS: &str = "KpiLayout";
const LAYOUT_FIELDS: [&str; 7] = ["tenantId", "dashboardId", "kpiId", "x", "y", "w", "h"];

/// One page of KPI definitions.
///
/// `total` is exact when the backend supports aggregation; otherwise it is
/// the documented approximation `offset + len(page)`, which undercounts
/// only when the page came back full.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KpiPage {
    pub items: Vec<KpiDefinition>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

impl CatalogEngine {
    /// List KPI definitions with pagination and an OR tag filter.
    pub async fn list_kpis(
        &self,
        tenant_id: &str,
        limit: usize,
        offset: usize,
        tags: &[String],
    ) -> Result<KpiPage> {
        validate_tenant_id(tenant_id)?;
        let limit = limit.clamp(1, MAX_KPI_PAGE);

        let mut base = QuerySpec::new(KpiDefinition::CLASS)
            .fields(KpiDefinition::fields())
            .where_text("tenantId", tenant_id);
        if !tags.is_empty() {
            base = base.where_any_text("tags", tags.iter().cloned());
        }

        let page_spec = base
            .clone()
            .sort_desc("updatedAt")
            .limit(limit)
            .offset(offset);
        let rows = self.backend().query(&page_spec).await.or_else(|err| {
            if mirador_store::is_missing_class(&err) {
                tracing::warn!(class = KpiDefinition::CLASS, "backing class missing; treating as empty");
                Ok(Vec::new())
            } else {
                Err(err)
            }
        })?;
        let items: Vec<KpiDefinition> = rows
            .iter()
            .map(KpiDefinition::from_properties)
            .collect::<Result<_>>()?;

        let total = match self.backend().count(&base).await {
            Ok(Some(count)) => count,
            _ => (offset + items.len()) as i64,
        };

        Ok(KpiPage {
            total,
            limit,
            offset,
            items,
        })
    }

    /// Replace one KPI tile placement. Layouts are unversioned.
    pub async fn put_layout(&self, layout: &KpiLayout) -> Result<()> {
        validate_tenant_id(&layout.tenant_id)?;
        self.bootstrap().ensure(self.backend().as_ref()).await?;
        let id = deterministic_id(
            LAYOUT_CLASS,
            &layout.tenant_id,
            &[&layout.dashboard_id, &layout.kpi_id],
        );
        self.backend()
            .put_object(LAYOUT_CLASS, id, serde_json::to_value(layout)?)
            .await
    }

    /// All tile placements on one dashboard.
    pub async fn layouts_for_dashboard(
        &self,
        tenant_id: &str,
        dashboard_id: &str,
    ) -> Result<Vec<KpiLayout>> {
        validate_tenant_id(tenant_id)?;
        let spec = QuerySpec::new(LAYOUT_CLASS)
            .fields(LAYOUT_FIELDS)
            .where_text("tenantId", tenant_id)
            .where_text("dashboardId", dashboard_id)
            .limit(MAX_KPI_PAGE);
        let rows = self.backend().query(&spec).await.unwrap_or_default();
        rows.iter()
            .map(|row| serde_json::from_value(row.clone()).map_err(Into::into))
            .collect()
    }

    /// Remove one tile placement. Returns whether it existed.
    pub async fn delete_layout(
        &self,
        tenant_id: &str,
        dashboard_id: &str,
        kpi_id: &str,
    ) -> Result<bool> {
        validate_tenant_id(tenant_id)?;
        let id = deterministic_id(LAYOUT_CLASS, tenant_id, &[dashboard_id, kpi_id]);
        self.backend().delete_object(LAYOUT_CLASS, id).await
    }

    /// Label definitions for a metric, keyed by label name. When `names`
    /// is non-empty the result is restricted to those labels.
    pub async fn metric_label_defs(
        &self,
        tenant_id: &str,
        metric: &str,
        names: &[String],
    ) -> Result<HashMap<String, Label>> {
        let labels: Vec<Label> = self
            .list(tenant_id, &[("metric", metric)], MAX_KPI_PAGE)
            .await?;
        Ok(labels
            .into_iter()
            .filter(|l| names.is_empty() || names.iter().any(|n| n == &l.name))
            .map(|l| (l.name.clone(), l))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mirador_core::catalog::{KpiQuery, KpiSparkline, Visibility};
    use mirador_store::{MemoryStore, SchemaBootstrap};
    use std::sync::Arc;

    fn kpi(tenant: &str, id: &str, tags: &[&str]) -> KpiDefinition {
        KpiDefinition {
            tenant_id: tenant.into(),
            id: id.into(),
            kind: "latency".into(),
            name: format!("kpi {id}"),
            unit: "ms".into(),
            format: "duration_ms".into(),
            query: KpiQuery::default(),
            thresholds: vec![],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            sparkline: KpiSparkline::default(),
            owner_user_id: "u1".into(),
            visibility: Visibility::Org,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn engine() -> CatalogEngine {
        CatalogEngine::new(Arc::new(MemoryStore::new()), SchemaBootstrap::new())
    }

    #[tokio::test]
    async fn paginated_listing_with_total() {
        let engine = engine();
        for n in 0..7 {
            engine
                .upsert(kpi("t1", &format!("k{n}"), &["slo"]), "tester")
                .await
                .unwrap();
        }

        let page = engine.list_kpis("t1", 3, 0, &[]).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total, 7);
        assert_eq!(page.limit, 3);

        let page = engine.list_kpis("t1", 3, 6, &[]).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 7);
    }

    #[tokio::test]
    async fn tag_filter_is_or_of_equalities() {
        let engine = engine();
        engine.upsert(kpi("t1", "k1", &["slo"]), "t").await.unwrap();
        engine
            .upsert(kpi("t1", "k2", &["checkout"]), "t")
            .await
            .unwrap();
        engine
            .upsert(kpi("t1", "k3", &["infra"]), "t")
            .await
            .unwrap();

        let page = engine
            .list_kpis("t1", 50, 0, &["slo".into(), "checkout".into()])
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn layout_put_get_delete() {
        let engine = engine();
        let layout = KpiLayout {
            tenant_id: "t1".into(),
            dashboard_id: "d1".into(),
            kpi_id: "k1".into(),
            x: 0,
            y: 0,
            w: 6,
            h: 4,
        };
        engine.put_layout(&layout).await.unwrap();

        let layouts = engine.layouts_for_dashboard("t1", "d1").await.unwrap();
        assert_eq!(layouts, vec![layout.clone()]);

        assert!(engine.delete_layout("t1", "d1", "k1").await.unwrap());
        assert!(engine
            .layouts_for_dashboard("t1", "d1")
            .await
            .unwrap()
            .is_empty());
    }
}
