//! Catalog entity types.
//!
//! Tenant-scoped telemetry definitions: metrics, labels, log fields, trace
//! services and operations, KPI definitions, dashboards, and layouts.
//! Property names on the wire and in the store are camelCase; the structs
//! here serialize to exactly the stored property maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn initial_version() -> i64 {
    1
}

/// A metric definition in the telemetry catalog.
///
/// Unique per (tenantId, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub tenant_id: String,
    pub name: String,
    /// Human-readable definition of what the metric measures.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    /// Ordered tag sequence; stored as `text[]`.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    /// Directionality hint for dashboards ("positive", "negative", "neutral").
    #[serde(default)]
    pub sentiment: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub source: String,
    #[serde(default = "initial_version")]
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A label definition, optionally scoped to a metric.
///
/// Unique per (tenantId, metric-or-empty, name). A label with an empty
/// `metric` applies tenant-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub tenant_id: String,
    pub name: String,
    /// Owning metric name, empty for tenant-global labels.
    #[serde(default)]
    pub metric: String,
    /// Value type, e.g. "string", "int".
    #[serde(default)]
    pub label_type: String,
    #[serde(default)]
    pub required: bool,
    /// Free-form constraint dictionary, e.g. `{"enum": ["h1", "h2"]}`.
    #[serde(default)]
    pub allowed_values: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default = "initial_version")]
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A structured log field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogField {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default = "initial_version")]
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// A service participating in distributed traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceService {
    pub tenant_id: String,
    pub name: String,
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
    #[serde(default = "initial_version")]
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// An operation within a trace service.
///
/// Unique per (tenantId, service, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceOperation {
    pub tenant_id: String,
    /// Parent service name.
    pub service: String,
    pub name: String,
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
    #[serde(default = "initial_version")]
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Who can see a KPI definition or dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Org,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Org => "org",
            Visibility::Public => "public",
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

/// The structured query a KPI evaluates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiQuery {
    /// Query language, e.g. "metricsql", "logsql".
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub expr: String,
    #[serde(default)]
    pub datasource: String,
}

/// A single alerting threshold on a KPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiThreshold {
    /// Severity level, e.g. "warning", "critical".
    pub level: String,
    /// Comparison operator, e.g. ">", ">=", "<".
    pub operator: String,
    pub value: f64,
    #[serde(default)]
    pub description: String,
}

/// Sparkline rendering hints for a KPI tile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSparkline {
    #[serde(default)]
    pub enabled: bool,
    /// Backing metric for the sparkline series.
    #[serde(default)]
    pub metric: String,
    /// Lookback window, e.g. "1h", "24h".
    #[serde(default)]
    pub window: String,
}

/// A named, visualizable measurement definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiDefinition {
    pub tenant_id: String,
    #[serde(rename = "kpiId")]
    pub id: String,
    /// KPI kind, e.g. "availability", "latency", "business".
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Display format, e.g. "percent", "duration_ms".
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub query: KpiQuery,
    /// Ordered threshold list, most severe last.
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
    #[serde(default = "initial_version")]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dashboard grouping KPI tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub tenant_id: String,
    #[serde(rename = "dashboardId")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_user_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "initial_version")]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Placement of one KPI tile on one dashboard.
///
/// Ternary association keyed by (tenantId, dashboardId, kpiId); replaced
/// wholesale on write, never versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiLayout {
    pub tenant_id: String,
    pub dashboard_id: String,
    pub kpi_id: String,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

/// Summary of one immutable version row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: i64,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// A stored version row: the full entity payload at one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub tenant_id: String,
    /// Joined natural key, key parts separated by `/`.
    pub key: String,
    pub version: i64,
    /// JSON snapshot of the entity at this version.
    pub payload: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl VersionRecord {
    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            version: self.version,
            author: self.author.clone(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_round_trips_through_properties() {
        let metric = Metric {
            tenant_id: "t1".into(),
            name: "cpu_usage".into(),
            description: "CPU busy fraction".into(),
            owner: "platform".into(),
            tags: vec!["env:dev".into(), "team:core".into()],
            category: "infra".into(),
            sentiment: "negative".into(),
            unit: "percent".into(),
            source: "node_exporter".into(),
            version: 3,
            updated_at: Utc::now(),
        };

        let props = serde_json::to_value(&metric).unwrap();
        assert_eq!(props["tenantId"], "t1");
        assert_eq!(props["tags"][0], "env:dev");

        let back: Metric = serde_json::from_value(props).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn kpi_id_serializes_as_kpi_id() {
        let kpi = KpiDefinition {
            tenant_id: "t1".into(),
            id: "k1".into(),
            kind: "latency".into(),
            name: "p99 checkout".into(),
            unit: "ms".into(),
            format: "duration_ms".into(),
            query: KpiQuery {
                language: "metricsql".into(),
                expr: "histogram_quantile(0.99, checkout_latency)".into(),
                datasource: "metrics".into(),
            },
            thresholds: vec![KpiThreshold {
                level: "critical".into(),
                operator: ">".into(),
                value: 750.0,
                description: "checkout too slow".into(),
            }],
            tags: vec!["checkout".into()],
            sparkline: KpiSparkline {
                enabled: true,
                metric: "checkout_latency".into(),
                window: "1h".into(),
            },
            owner_user_id: "u1".into(),
            visibility: Visibility::Org,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let props = serde_json::to_value(&kpi).unwrap();
        assert_eq!(props["kpiId"], "k1");
        assert!(props.get("id").is_none());
        assert_eq!(props["visibility"], "org");
        assert_eq!(props["thresholds"][0]["operator"], ">");
    }

    #[test]
    fn missing_optional_fields_default() {
        let now = Utc::now();
        let props = serde_json::json!({
            "tenantId": "t1",
            "name": "disk_free",
            "updatedAt": now,
        });
        let metric: Metric = serde_json::from_value(props).unwrap();
        assert_eq!(metric.version, 1);
        assert!(metric.tags.is_empty());
        assert!(metric.description.is_empty());
    }

    #[test]
    fn visibility_default_is_private() {
        assert_eq!(Visibility::default(), Visibility::Private);
        assert_eq!(Visibility::Public.as_str(), "public");
    }
}
