//! RBAC entity types.
//!
//! Users and tenants are global; everything else is tenant-scoped.
//! Enum string forms match the stored property values and the wire API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform-wide privilege level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    GlobalAdmin,
    GlobalTenantAdmin,
    None,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::GlobalAdmin => "global_admin",
            GlobalRole::GlobalTenantAdmin => "global_tenant_admin",
            GlobalRole::None => "none",
        }
    }
}

impl Default for GlobalRole {
    fn default() -> Self {
        GlobalRole::None
    }
}

/// Account status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Deactivated,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Deactivated => "deactivated",
        }
    }
}

/// A platform user (global entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "userId")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub global_role: GlobalRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    PendingDeletion,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::PendingDeletion => "pending_deletion",
        }
    }
}

/// Resource quotas granted to a tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuotas {
    #[serde(default)]
    pub max_users: i64,
    #[serde(default)]
    pub max_kpis: i64,
    #[serde(default)]
    pub max_dashboards: i64,
}

/// A top-level isolation unit (global entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    #[serde(rename = "tenantId")]
    pub id: String,
    pub name: String,
    pub admin_email: String,
    pub status: TenantStatus,
    /// System tenants cannot be deleted.
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub quotas: TenantQuotas,
    #[serde(default)]
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role of a user within one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    TenantAdmin,
    TenantEditor,
    TenantGuest,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantRole::TenantAdmin => "tenant_admin",
            TenantRole::TenantEditor => "tenant_editor",
            TenantRole::TenantGuest => "tenant_guest",
        }
    }
}

/// Membership status of a user within one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Invited,
    Suspended,
    Removed,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Invited => "invited",
            MembershipStatus::Suspended => "suspended",
            MembershipStatus::Removed => "removed",
        }
    }
}

/// A user's membership in a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUser {
    pub tenant_id: String,
    pub user_id: String,
    pub tenant_role: TenantRole,
    pub status: MembershipStatus,
    /// Extra permission ids granted directly, outside any role.
    #[serde(default)]
    pub additional_permissions: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named permission bundle, possibly inheriting from parent roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Permission ids of the form `resource:action(:scope)?`.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Parent role names; the parent graph must stay acyclic.
    #[serde(default)]
    pub parent_roles: Vec<String>,
    /// System roles are immutable and undeletable.
    #[serde(default)]
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Time-of-day constraints on a permission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeConditions {
    /// Inclusive "HH:MM-HH:MM" windows; empty means any time.
    #[serde(default)]
    pub allowed_hours: Vec<String>,
    /// Weekday names, case-insensitive; empty means any day.
    #[serde(default)]
    pub allowed_days: Vec<String>,
}

impl TimeConditions {
    pub fn is_empty(&self) -> bool {
        self.allowed_hours.is_empty() && self.allowed_days.is_empty()
    }
}

/// Attribute constraints on a permission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConditions {
    /// Departments allowed to use the permission; empty means any.
    #[serde(default)]
    pub department: Vec<String>,
    /// Minimum clearance level name, if required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance_level: Option<String>,
}

impl AttributeConditions {
    pub fn is_empty(&self) -> bool {
        self.department.is_empty() && self.clearance_level.is_none()
    }
}

/// The full constraint set evaluated as a conjunction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionConditions {
    #[serde(default)]
    pub time_based: TimeConditions,
    /// IP allow-list; literal addresses or simplified CIDR entries.
    #[serde(default)]
    pub ip_based: Vec<String>,
    #[serde(default)]
    pub attribute_based: AttributeConditions,
}

impl PermissionConditions {
    pub fn is_empty(&self) -> bool {
        self.time_based.is_empty() && self.ip_based.is_empty() && self.attribute_based.is_empty()
    }
}

/// A grantable permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub tenant_id: String,
    #[serde(rename = "permissionId")]
    pub id: String,
    pub resource: String,
    pub action: String,
    /// "global", "tenant", or a specific resource/tenant id.
    #[serde(default)]
    pub scope: String,
    /// Glob pattern with `*`; used when resource equality fails.
    #[serde(default)]
    pub resource_pattern: String,
    #[serde(default)]
    pub conditions: PermissionConditions,
}

impl Permission {
    /// Parse a permission id of the form `resource:action(:scope)?` into
    /// an unconditioned permission.
    pub fn from_spec(tenant_id: &str, spec: &str) -> Option<Self> {
        let mut parts = spec.splitn(3, ':');
        let resource = parts.next()?.trim();
        let action = parts.next()?.trim();
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        let scope = parts.next().unwrap_or("tenant").trim();
        if scope.is_empty() {
            return None;
        }
        Some(Permission {
            tenant_id: tenant_id.to_string(),
            id: spec.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            scope: scope.to_string(),
            resource_pattern: String::new(),
            conditions: PermissionConditions::default(),
        })
    }
}

/// A user group with role grants and nested parent groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Parent group names; the parent graph must stay acyclic.
    #[serde(default)]
    pub parent_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of subject a role binding grants to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    User,
    Group,
    Service,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Group => "group",
            SubjectType::Service => "service",
        }
    }
}

/// Grant of a role to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub tenant_id: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub role_id: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub precedence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: PermissionConditions,
}

impl RoleBinding {
    /// True when the binding is inside its validity window at `now`.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        if let Some(nb) = self.not_before {
            if now < nb {
                return false;
            }
        }
        if let Some(exp) = self.expires_at {
            if now >= exp {
                return false;
            }
        }
        true
    }
}

/// Everything needed to evaluate a permission check.
#[derive(Debug, Clone)]
pub struct PermissionContext {
    pub user_id: String,
    pub tenant_id: String,
    pub resource: String,
    pub action: String,
    pub request_time: DateTime<Utc>,
    pub ip_address: String,
    pub user_attributes: HashMap<String, String>,
}

impl PermissionContext {
    pub fn new(tenant_id: &str, user_id: &str, resource: &str, action: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            request_time: Utc::now(),
            ip_address: String::new(),
            user_attributes: HashMap::new(),
        }
    }
}

/// Clearance ladder used by attribute constraints. Unknown levels rank 0
/// and therefore never satisfy a clearance requirement.
pub fn clearance_rank(level: &str) -> u8 {
    match level {
        "public" => 1,
        "internal" => 2,
        "confidential" => 3,
        "secret" => 4,
        "top_secret" => 5,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_role_strings() {
        assert_eq!(GlobalRole::GlobalAdmin.as_str(), "global_admin");
        assert_eq!(GlobalRole::GlobalTenantAdmin.as_str(), "global_tenant_admin");
        assert_eq!(GlobalRole::None.as_str(), "none");
        let v = serde_json::to_value(GlobalRole::GlobalAdmin).unwrap();
        assert_eq!(v, "global_admin");
    }

    #[test]
    fn permission_from_spec_defaults_scope_to_tenant() {
        let p = Permission::from_spec("t1", "dashboard:read").unwrap();
        assert_eq!(p.resource, "dashboard");
        assert_eq!(p.action, "read");
        assert_eq!(p.scope, "tenant");
        assert!(p.conditions.is_empty());
    }

    #[test]
    fn permission_from_spec_with_scope() {
        let p = Permission::from_spec("t1", "kpi_definition:admin:global").unwrap();
        assert_eq!(p.scope, "global");
    }

    #[test]
    fn permission_from_spec_rejects_malformed() {
        assert!(Permission::from_spec("t1", "dashboard").is_none());
        assert!(Permission::from_spec("t1", ":read").is_none());
        assert!(Permission::from_spec("t1", "dashboard:").is_none());
    }

    #[test]
    fn clearance_ladder_is_monotonic() {
        assert!(clearance_rank("top_secret") > clearance_rank("secret"));
        assert!(clearance_rank("secret") > clearance_rank("confidential"));
        assert!(clearance_rank("confidential") > clearance_rank("internal"));
        assert!(clearance_rank("internal") > clearance_rank("public"));
        assert_eq!(clearance_rank("unknown"), 0);
    }

    #[test]
    fn role_binding_validity_window() {
        let now = Utc::now();
        let binding = RoleBinding {
            tenant_id: "t1".into(),
            subject_type: SubjectType::User,
            subject_id: "u1".into(),
            role_id: "viewer".into(),
            scope: "tenant".into(),
            resource_id: String::new(),
            precedence: 0,
            expires_at: Some(now + chrono::Duration::hours(1)),
            not_before: Some(now - chrono::Duration::hours(1)),
            conditions: PermissionConditions::default(),
        };
        assert!(binding.is_effective(now));
        assert!(!binding.is_effective(now + chrono::Duration::hours(2)));
        assert!(!binding.is_effective(now - chrono::Duration::hours(2)));
    }
}
