//! The entity seam between typed definitions and stored property maps.

use chrono::{DateTime, Utc};
use mirador_core::catalog::{
    Dashboard, KpiDefinition, Label, LogField, Metric, TraceOperation, TraceService,
};
use mirador_core::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A catalog entity family: one primary class plus one version class.
///
/// `to_properties`/`from_properties` are the only conversion path between
/// Rust types and stored property maps, so the serde representation *is*
/// the storage schema.
pub trait CatalogEntity:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    const CLASS: &'static str;
    const VERSION_CLASS: &'static str;
    /// Entity kind in signals and not-found errors, e.g. "metric".
    const KIND: &'static str;
    /// Property names forming the natural key, in order, after tenantId.
    const KEY_FIELDS: &'static [&'static str];

    fn tenant_id(&self) -> &str;

    /// Natural-key values in `KEY_FIELDS` order.
    fn key_values(&self) -> Vec<String>;

    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);

    /// Update the last-modified timestamp.
    fn touch(&mut self, now: DateTime<Utc>);

    /// Properties to fetch on reads; driven by the class schema.
    fn fields() -> Vec<&'static str> {
        mirador_store::schema::class_definition(Self::CLASS)
            .map(|def| def.properties.iter().map(|p| p.name).collect())
            .unwrap_or_default()
    }

    fn to_properties(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(CoreError::from)
    }

    fn from_properties(properties: &Value) -> Result<Self> {
        serde_json::from_value(properties.clone()).map_err(CoreError::from)
    }
}

impl CatalogEntity for Metric {
    const CLASS: &'static str = "Metric";
    const VERSION_CLASS: &'static str = "MetricVersion";
    const KIND: &'static str = "metric";
    const KEY_FIELDS: &'static [&'static str] = &["name"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl CatalogEntity for Label {
    const CLASS: &'static str = "Label";
    const VERSION_CLASS: &'static str = "LabelVersion";
    const KIND: &'static str = "label";
    // Empty metric means a tenant-global label.
    const KEY_FIELDS: &'static [&'static str] = &["metric", "name"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.metric.clone(), self.name.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl CatalogEntity for LogField {
    const CLASS: &'static str = "LogField";
    const VERSION_CLASS: &'static str = "LogFieldVersion";
    const KIND: &'static str = "log_field";
    const KEY_FIELDS: &'static [&'static str] = &["name"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl CatalogEntity for TraceService {
    const CLASS: &'static str = "TraceService";
    const VERSION_CLASS: &'static str = "TraceServiceVersion";
    const KIND: &'static str = "trace_service";
    const KEY_FIELDS: &'static [&'static str] = &["name"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl CatalogEntity for TraceOperation {
    const CLASS: &'static str = "TraceOperation";
    const VERSION_CLASS: &'static str = "TraceOperationVersion";
    const KIND: &'static str = "trace_operation";
    const KEY_FIELDS: &'static [&'static str] = &["service", "name"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.service.clone(), self.name.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl CatalogEntity for KpiDefinition {
    const CLASS: &'static str = "KpiDefinition";
    const VERSION_CLASS: &'static str = "KpiVersion";
    const KIND: &'static str = "kpi_definition";
    const KEY_FIELDS: &'static [&'static str] = &["kpiId"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.id.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl CatalogEntity for Dashboard {
    const CLASS: &'static str = "Dashboard";
    const VERSION_CLASS: &'static str = "DashboardVersion";
    const KIND: &'static str = "dashboard";
    const KEY_FIELDS: &'static [&'static str] = &["dashboardId"];

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn key_values(&self) -> Vec<String> {
        vec![self.id.clone()]
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_come_from_the_class_schema() {
        let fields = <Metric as CatalogEntity>::fields();
        assert!(fields.contains(&"tenantId"));
        assert!(fields.contains(&"version"));
        assert!(fields.contains(&"updatedAt"));
    }

    #[test]
    fn key_fields_match_key_values() {
        let op = TraceOperation {
            tenant_id: "t1".into(),
            service: "checkout".into(),
            name: "charge".into(),
            purpose: String::new(),
            owner: String::new(),
            tags: vec![],
            category: String::new(),
            sentiment: String::new(),
            version: 1,
            updated_at: Utc::now(),
        };
        assert_eq!(TraceOperation::KEY_FIELDS.len(), op.key_values().len());
        assert_eq!(op.key_values(), vec!["checkout", "charge"]);
    }
}
