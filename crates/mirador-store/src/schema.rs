//! Class catalog and schema bootstrap.
//!
//! Every entity family the control plane persists is declared here, in one
//! place, with its property schema. [`SchemaBootstrap::ensure`] creates
//! missing classes on first write per process; repeat calls are no-ops.

use std::sync::Arc;

use mirador_core::Result;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::VectorBackend;

/// One typed property of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: &'static str,
    /// Store data type: "text", "text[]", "int", "number", "boolean",
    /// "date", "object", "object[]".
    pub data_type: &'static str,
}

const fn prop(name: &'static str, data_type: &'static str) -> PropertyDef {
    PropertyDef { name, data_type }
}

/// A class and its property schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDefinition {
    pub class: &'static str,
    pub description: &'static str,
    pub properties: &'static [PropertyDef],
}

/// Properties shared by every version class.
const VERSION_PROPERTIES: &[PropertyDef] = &[
    prop("tenantId", "text"),
    prop("key", "text"),
    prop("version", "int"),
    prop("payload", "text"),
    prop("author", "text"),
    prop("createdAt", "date"),
];

const CLASSES: &[ClassDefinition] = &[
    ClassDefinition {
        class: "Metric",
        description: "Metric definitions in the telemetry catalog",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("description", "text"),
            prop("owner", "text"),
            prop("tags", "text[]"),
            prop("category", "text"),
            prop("sentiment", "text"),
            prop("unit", "text"),
            prop("source", "text"),
            prop("version", "int"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "MetricVersion",
        description: "Immutable metric definition history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "Label",
        description: "Label definitions, optionally scoped to a metric",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("metric", "text"),
            prop("labelType", "text"),
            prop("required", "boolean"),
            prop("allowedValues", "object"),
            prop("description", "text"),
            prop("category", "text"),
            prop("sentiment", "text"),
            prop("version", "int"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "LabelVersion",
        description: "Immutable label definition history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "LogField",
        description: "Structured log field definitions",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("fieldType", "text"),
            prop("description", "text"),
            prop("tags", "text[]"),
            prop("category", "text"),
            prop("sentiment", "text"),
            prop("version", "int"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "LogFieldVersion",
        description: "Immutable log field history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "TraceService",
        description: "Services participating in distributed traces",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("purpose", "text"),
            prop("owner", "text"),
            prop("tags", "text[]"),
            prop("category", "text"),
            prop("sentiment", "text"),
            prop("version", "int"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "TraceServiceVersion",
        description: "Immutable trace service history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "TraceOperation",
        description: "Operations within a trace service",
        properties: &[
            prop("tenantId", "text"),
            prop("service", "text"),
            prop("name", "text"),
            prop("purpose", "text"),
            prop("owner", "text"),
            prop("tags", "text[]"),
            prop("category", "text"),
            prop("sentiment", "text"),
            prop("version", "int"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "TraceOperationVersion",
        description: "Immutable trace operation history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "KpiDefinition",
        description: "KPI definitions with queries and thresholds",
        properties: &[
            prop("tenantId", "text"),
            prop("kpiId", "text"),
            prop("kind", "text"),
            prop("name", "text"),
            prop("unit", "text"),
            prop("format", "text"),
            prop("query", "object"),
            prop("thresholds", "object[]"),
            prop("tags", "text[]"),
            prop("sparkline", "object"),
            prop("ownerUserId", "text"),
            prop("visibility", "text"),
            prop("version", "int"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "KpiVersion",
        description: "Immutable KPI definition history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "Dashboard",
        description: "Dashboards grouping KPI tiles",
        properties: &[
            prop("tenantId", "text"),
            prop("dashboardId", "text"),
            prop("name", "text"),
            prop("ownerUserId", "text"),
            prop("visibility", "text"),
            prop("isDefault", "boolean"),
            prop("version", "int"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "DashboardVersion",
        description: "Immutable dashboard history",
        properties: VERSION_PROPERTIES,
    },
    ClassDefinition {
        class: "KpiLayout",
        description: "Placement of KPI tiles on dashboards",
        properties: &[
            prop("tenantId", "text"),
            prop("dashboardId", "text"),
            prop("kpiId", "text"),
            prop("x", "int"),
            prop("y", "int"),
            prop("w", "int"),
            prop("h", "int"),
        ],
    },
    ClassDefinition {
        class: "RbacUser",
        description: "Platform users",
        properties: &[
            prop("userId", "text"),
            prop("email", "text"),
            prop("username", "text"),
            prop("fullName", "text"),
            prop("globalRole", "text"),
            prop("status", "text"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "RbacTenant",
        description: "Tenants",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("adminEmail", "text"),
            prop("status", "text"),
            prop("isSystem", "boolean"),
            prop("quotas", "object"),
            prop("features", "text[]"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "RbacTenantUser",
        description: "User memberships within tenants",
        properties: &[
            prop("tenantId", "text"),
            prop("userId", "text"),
            prop("tenantRole", "text"),
            prop("status", "text"),
            prop("additionalPermissions", "text[]"),
            prop("metadata", "object"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "RbacRole",
        description: "Roles with permission bundles and parent roles",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("description", "text"),
            prop("permissions", "text[]"),
            prop("parentRoles", "text[]"),
            prop("isSystem", "boolean"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "RbacPermission",
        description: "Grantable permissions with constraints",
        properties: &[
            prop("tenantId", "text"),
            prop("permissionId", "text"),
            prop("resource", "text"),
            prop("action", "text"),
            prop("scope", "text"),
            prop("resourcePattern", "text"),
            prop("conditions", "object"),
        ],
    },
    ClassDefinition {
        class: "RbacGroup",
        description: "User groups with role grants and parent groups",
        properties: &[
            prop("tenantId", "text"),
            prop("name", "text"),
            prop("members", "text[]"),
            prop("roles", "text[]"),
            prop("parentGroups", "text[]"),
            prop("createdAt", "date"),
            prop("updatedAt", "date"),
        ],
    },
    ClassDefinition {
        class: "RbacRoleBinding",
        description: "Role grants to users, groups, and services",
        properties: &[
            prop("tenantId", "text"),
            prop("subjectType", "text"),
            prop("subjectId", "text"),
            prop("roleId", "text"),
            prop("scope", "text"),
            prop("resourceId", "text"),
            prop("precedence", "int"),
            prop("expiresAt", "date"),
            prop("notBefore", "date"),
            prop("conditions", "object"),
        ],
    },
    ClassDefinition {
        class: "RbacAuditLog",
        description: "Audit events for checks and mutations",
        properties: &[
            prop("tenantId", "text"),
            prop("timestamp", "date"),
            prop("subjectId", "text"),
            prop("subjectType", "text"),
            prop("action", "text"),
            prop("resource", "text"),
            prop("resourceId", "text"),
            prop("result", "text"),
            prop("severity", "text"),
            prop("source", "text"),
            prop("correlationId", "text"),
            prop("retentionClass", "text"),
            prop("details", "object"),
        ],
    },
];

/// All classes the control plane persists.
pub fn class_definitions() -> &'static [ClassDefinition] {
    CLASSES
}

/// Look up one class definition by name.
pub fn class_definition(class: &str) -> Option<&'static ClassDefinition> {
    CLASSES.iter().find(|c| c.class == class)
}

/// One-per-process schema initializer.
///
/// Safe under concurrent first use: the flag lives behind an async mutex,
/// so exactly one caller runs the class creation pass and the rest wait.
#[derive(Debug, Default)]
pub struct SchemaBootstrap {
    done: Mutex<bool>,
}

impl SchemaBootstrap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ensure every known class exists. Runs the creation pass at most
    /// once per process; later calls return immediately.
    pub async fn ensure(&self, backend: &dyn VectorBackend) -> Result<()> {
        let mut done = self.done.lock().await;
        if *done {
            return Ok(());
        }
        Self::create_missing(backend).await?;
        *done = true;
        Ok(())
    }

    /// Re-run the creation pass unconditionally. Used after a write fails
    /// with a missing-class error, which means the store lost schema state
    /// after our flag was set.
    pub async fn force(&self, backend: &dyn VectorBackend) -> Result<()> {
        let mut done = self.done.lock().await;
        Self::create_missing(backend).await?;
        *done = true;
        Ok(())
    }

    async fn create_missing(backend: &dyn VectorBackend) -> Result<()> {
        let existing = backend.list_classes().await?;
        let mut created = 0usize;
        for def in CLASSES {
            if existing.iter().any(|c| c == def.class) {
                debug!(class = def.class, "class already present");
                continue;
            }
            backend.ensure_class(def).await?;
            created += 1;
        }
        info!(created, total = CLASSES.len(), "schema bootstrap complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn every_primary_class_has_tenant_scope_or_is_global() {
        // Global classes carry their own id property instead of tenantId.
        let global = ["RbacUser"];
        for def in class_definitions() {
            let has_tenant = def.properties.iter().any(|p| p.name == "tenantId");
            assert!(
                has_tenant || global.contains(&def.class),
                "{} lacks tenantId",
                def.class
            );
        }
    }

    #[test]
    fn version_classes_share_schema() {
        for class in [
            "MetricVersion",
            "LabelVersion",
            "LogFieldVersion",
            "TraceServiceVersion",
            "TraceOperationVersion",
            "KpiVersion",
            "DashboardVersion",
        ] {
            let def = class_definition(class).expect(class);
            assert_eq!(def.properties, VERSION_PROPERTIES);
        }
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let store = MemoryStore::new();
        let bootstrap = SchemaBootstrap::new();

        bootstrap.ensure(&store).await.unwrap();
        let first = store.list_classes().await.unwrap().len();
        assert_eq!(first, class_definitions().len());

        // Repeated calls leave the store unchanged.
        bootstrap.ensure(&store).await.unwrap();
        bootstrap.force(&store).await.unwrap();
        assert_eq!(store.list_classes().await.unwrap().len(), first);
    }

    #[tokio::test]
    async fn concurrent_first_use_runs_once() {
        let store = Arc::new(MemoryStore::new());
        let bootstrap = SchemaBootstrap::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let bootstrap = Arc::clone(&bootstrap);
            handles.push(tokio::spawn(async move {
                bootstrap.ensure(store.as_ref()).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(
            store.list_classes().await.unwrap().len(),
            class_definitions().len()
        );
    }
}
