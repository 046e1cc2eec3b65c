//! Permission evaluation and audited RBAC mutations.
//!
//! `check_permission` walks the privilege hierarchy: global role, tenant
//! membership, explicit role bindings (with parent-role inheritance),
//! group grants (with parent groups), and finally per-permission
//! constraints. Traversals carry visited sets, so evaluation terminates
//! even on cyclic graphs that slipped past assignment validation.

use std::collections::HashSet;
use std::sync::Arc;

use mirador_core::rbac::{
    clearance_rank, AttributeConditions, GlobalRole, MembershipStatus, Permission,
    PermissionConditions, PermissionContext, Role, Tenant, TenantUser, TimeConditions, User,
};
use mirador_core::Result;
use regex::Regex;
use tracing::warn;

use crate::audit::{AuditEvent, AuditSink, Severity};
use crate::repo::RbacRepository;

/// Permission specs granted by the built-in tenant roles when no role
/// object of that name exists in the registry.
fn builtin_role(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "tenant_admin" => Some(&["*:*:tenant"]),
        "tenant_editor" => Some(&[
            "dashboard:*:tenant",
            "kpi_definition:*:tenant",
            "layout:*:tenant",
            "metric:*:tenant",
            "logs:*:tenant",
            "traces:*:tenant",
        ]),
        "tenant_guest" => Some(&[
            "dashboard:read:tenant",
            "kpi_definition:read:tenant",
            "metric:read:tenant",
        ]),
        _ => None,
    }
}

/// Fixed mapping of actions a global_tenant_admin may perform.
pub fn is_admin_action(resource: &str, action: &str) -> bool {
    match resource {
        "admin" | "rbac" => true,
        "tenant" => matches!(action, "admin" | "update"),
        "user" => matches!(action, "admin" | "create" | "update" | "delete" | "list"),
        "dashboard" | "kpi_definition" | "layout" => action == "admin",
        _ => false,
    }
}

/// Does a permission cover the requested (resource, action, scope)?
pub fn permission_matches(ctx: &PermissionContext, permission: &Permission) -> bool {
    action_matches(&permission.action, &ctx.action)
        && resource_matches(permission, &ctx.resource)
        && scope_matches(&permission.scope, &ctx.tenant_id)
}

fn action_matches(granted: &str, requested: &str) -> bool {
    granted == "*" || granted == requested
}

fn resource_matches(permission: &Permission, requested: &str) -> bool {
    if permission.resource == requested {
        return true;
    }

    // Glob pattern: explicit resourcePattern wins, otherwise a resource
    // containing `*` is itself the pattern. Anchored on both ends.
    let pattern = if !permission.resource_pattern.is_empty() {
        Some(permission.resource_pattern.as_str())
    } else if permission.resource.contains('*') {
        Some(permission.resource.as_str())
    } else {
        None
    };
    if let Some(pattern) = pattern {
        let anchored = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
        match Regex::new(&anchored) {
            Ok(re) if re.is_match(requested) => return true,
            Ok(_) => {}
            Err(err) => warn!(pattern, error = %err, "unusable resource pattern"),
        }
    }

    // Hierarchical prefix: a grant on "dashboard" covers "dashboard/d1".
    !permission.resource.is_empty() && requested.starts_with(&format!("{}/", permission.resource))
}

fn scope_matches(scope: &str, tenant_id: &str) -> bool {
    scope == "global" || (scope == "tenant" && !tenant_id.is_empty()) || scope == tenant_id
}

/// Conjunction of the time, IP, and attribute constraint families.
pub fn evaluate_constraints(ctx: &PermissionContext, conditions: &PermissionConditions) -> bool {
    time_allows(ctx, &conditions.time_based)
        && ip_allows(&ctx.ip_address, &conditions.ip_based)
        && attributes_allow(ctx, &conditions.attribute_based)
}

fn time_allows(ctx: &PermissionContext, time: &TimeConditions) -> bool {
    if !time.allowed_days.is_empty() {
        let weekday = ctx.request_time.format("%A").to_string().to_lowercase();
        if !time
            .allowed_days
            .iter()
            .any(|d| d.to_lowercase() == weekday)
        {
            return false;
        }
    }
    if !time.allowed_hours.is_empty() {
        let now = ctx.request_time.format("%H:%M").to_string();
        // "HH:MM-HH:MM" windows compare lexicographically.
        let in_any_window = time.allowed_hours.iter().any(|window| {
            window
                .split_once('-')
                .map(|(start, end)| {
                    let start = start.trim();
                    let end = end.trim();
                    start <= now.as_str() && now.as_str() <= end
                })
                .unwrap_or(false)
        });
        if !in_any_window {
            return false;
        }
    }
    true
}

fn ip_allows(ip: &str, allow_list: &[String]) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    if ip.is_empty() {
        return false;
    }
    allow_list.iter().any(|entry| {
        if entry == ip {
            return true;
        }
        // Simplified CIDR: drop the mask, strip trailing ".0" octets of
        // the network, then prefix-match on an octet boundary.
        let Some((network, _mask)) = entry.split_once('/') else {
            return false;
        };
        let mut prefix = network;
        while let Some(stripped) = prefix.strip_suffix(".0") {
            prefix = stripped;
        }
        ip == prefix || ip.starts_with(&format!("{prefix}."))
    })
}

fn attributes_allow(ctx: &PermissionContext, attrs: &AttributeConditions) -> bool {
    if !attrs.department.is_empty() {
        let department = ctx.user_attributes.get("department");
        if !department.is_some_and(|d| attrs.department.iter().any(|a| a == d)) {
            return false;
        }
    }
    if let Some(required) = &attrs.clearance_level {
        let held = ctx
            .user_attributes
            .get("clearance_level")
            .map(String::as_str)
            .unwrap_or_default();
        if clearance_rank(held) < clearance_rank(required) {
            return false;
        }
    }
    true
}

/// The RBAC engine: permission checks plus audited lifecycle mutations.
pub struct RbacEngine {
    repo: Arc<RbacRepository>,
    audit: AuditSink,
}

impl RbacEngine {
    pub fn new(repo: Arc<RbacRepository>, audit: AuditSink) -> Self {
        Self { repo, audit }
    }

    pub fn repo(&self) -> &Arc<RbacRepository> {
        &self.repo
    }

    pub fn audit_sink(&self) -> &AuditSink {
        &self.audit
    }

    /// Evaluate a permission check and audit the outcome.
    pub async fn check_permission(&self, ctx: &PermissionContext) -> Result<bool> {
        let decision = self.evaluate(ctx).await;
        match &decision {
            Ok(allowed) => self.audit.log(AuditEvent::check(ctx, *allowed)),
            Err(err) => self.audit.log(AuditEvent::failure(
                &ctx.tenant_id,
                &ctx.user_id,
                "rbac.check",
                &ctx.resource,
                &err.to_string(),
            )),
        }
        decision
    }

    async fn evaluate(&self, ctx: &PermissionContext) -> Result<bool> {
        // 1. The user must exist.
        let Some(user) = self.repo.get_user(&ctx.user_id).await? else {
            return Ok(false);
        };

        // 2-3. Global roles short-circuit tenant evaluation.
        match user.global_role {
            GlobalRole::GlobalAdmin => return Ok(true),
            GlobalRole::GlobalTenantAdmin if is_admin_action(&ctx.resource, &ctx.action) => {
                return Ok(true)
            }
            _ => {}
        }

        // 4. An active membership in the tenant is required.
        let Some(membership) = self
            .repo
            .get_tenant_user(&ctx.tenant_id, &ctx.user_id)
            .await?
        else {
            return Ok(false);
        };
        if membership.status != MembershipStatus::Active {
            return Ok(false);
        }

        // 5-6. Collect every reachable permission and look for a match
        // whose constraints hold.
        let permissions = self.collect_all_permissions(ctx, &membership).await?;
        for permission in &permissions {
            if permission_matches(ctx, permission)
                && evaluate_constraints(ctx, &permission.conditions)
            {
                return Ok(true);
            }
        }

        // 7. Default deny.
        Ok(false)
    }

    /// Gather permissions from role bindings, the built-in tenant role,
    /// direct grants, and group membership, following parent chains with
    /// cycle-safe visited sets.
    pub async fn collect_all_permissions(
        &self,
        ctx: &PermissionContext,
        membership: &TenantUser,
    ) -> Result<Vec<Permission>> {
        let tenant_id = &ctx.tenant_id;
        let mut out: Vec<Permission> = Vec::new();
        let mut visited_roles: HashSet<String> = HashSet::new();

        let bindings = self
            .repo
            .user_role_bindings(tenant_id, &ctx.user_id)
            .await?;
        for binding in bindings
            .iter()
            .filter(|b| b.is_effective(ctx.request_time))
        {
            self.resolve_role(tenant_id, &binding.role_id, &mut visited_roles, &mut out)
                .await?;
        }

        self.resolve_role(
            tenant_id,
            membership.tenant_role.as_str(),
            &mut visited_roles,
            &mut out,
        )
        .await?;

        for spec in &membership.additional_permissions {
            if let Some(p) = self.resolve_permission_id(tenant_id, spec).await? {
                out.push(p);
            }
        }

        let mut visited_groups: HashSet<String> = HashSet::new();
        let direct_groups = self.repo.user_groups(tenant_id, &ctx.user_id).await?;
        for group in &direct_groups {
            self.resolve_group(tenant_id, &group.name, &mut visited_groups, &mut visited_roles, &mut out)
                .await?;
        }

        Ok(out)
    }

    /// Resolve a role and its parent chain into permissions.
    async fn resolve_role(
        &self,
        tenant_id: &str,
        root: &str,
        visited: &mut HashSet<String>,
        out: &mut Vec<Permission>,
    ) -> Result<()> {
        let mut stack = vec![root.to_string()];
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            match self.repo.get_role(tenant_id, &name).await? {
                Some(role) => {
                    for spec in &role.permissions {
                        if let Some(p) = self.resolve_permission_id(tenant_id, spec).await? {
                            out.push(p);
                        }
                    }
                    stack.extend(role.parent_roles.iter().cloned());
                }
                None => {
                    if let Some(specs) = builtin_role(&name) {
                        out.extend(
                            specs
                                .iter()
                                .filter_map(|s| Permission::from_spec(tenant_id, s)),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve a group and its parent chain: every role granted by any
    /// reachable group contributes permissions.
    async fn resolve_group(
        &self,
        tenant_id: &str,
        root: &str,
        visited_groups: &mut HashSet<String>,
        visited_roles: &mut HashSet<String>,
        out: &mut Vec<Permission>,
    ) -> Result<()> {
        let mut stack = vec![root.to_string()];
        while let Some(name) = stack.pop() {
            if !visited_groups.insert(name.clone()) {
                continue;
            }
            let Some(group) = self.repo.get_group(tenant_id, &name).await? else {
                continue;
            };
            for role in &group.roles {
                self.resolve_role(tenant_id, role, visited_roles, out).await?;
            }
            stack.extend(group.parent_groups.iter().cloned());
        }
        Ok(())
    }

    /// A permission id resolves to the stored permission object when one
    /// exists (carrying its constraints), otherwise it parses as a bare
    /// `resource:action(:scope)?` grant.
    async fn resolve_permission_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<Permission>> {
        if let Some(permission) = self.repo.get_permission(tenant_id, id).await? {
            return Ok(Some(permission));
        }
        let parsed = Permission::from_spec(tenant_id, id);
        if parsed.is_none() {
            warn!(tenant_id, id, "unresolvable permission id");
        }
        Ok(parsed)
    }

    // ------------------------------------------------------------------
    // Audited mutations
    // ------------------------------------------------------------------

    pub async fn put_role(&self, role: &Role, actor: &str) -> Result<()> {
        let result = self.repo.put_role(role).await;
        self.audit_outcome(
            &role.tenant_id,
            actor,
            "rbac.role.put",
            "role",
            &role.name,
            Severity::Medium,
            &result,
        );
        result
    }

    pub async fn delete_role(&self, tenant_id: &str, name: &str, actor: &str) -> Result<bool> {
        let result = self.repo.delete_role(tenant_id, name).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.role.delete",
            "role",
            name,
            Severity::High,
            &result,
        );
        result
    }

    pub async fn assign_user_roles(
        &self,
        tenant_id: &str,
        user_id: &str,
        roles: &[String],
        actor: &str,
    ) -> Result<()> {
        let result = self.repo.assign_user_roles(tenant_id, user_id, roles).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.roles.assign",
            "user",
            user_id,
            Severity::High,
            &result,
        );
        result
    }

    pub async fn revoke_user_role(
        &self,
        tenant_id: &str,
        user_id: &str,
        role: &str,
        actor: &str,
    ) -> Result<bool> {
        let result = self.repo.revoke_user_role(tenant_id, user_id, role).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.roles.revoke",
            "user",
            user_id,
            Severity::High,
            &result,
        );
        result
    }

    pub async fn put_permission(&self, permission: &Permission, actor: &str) -> Result<()> {
        let result = self.repo.put_permission(permission).await;
        self.audit_outcome(
            &permission.tenant_id,
            actor,
            "rbac.permission.put",
            "permission",
            &permission.id,
            Severity::Medium,
            &result,
        );
        result
    }

    pub async fn delete_permission(
        &self,
        tenant_id: &str,
        id: &str,
        actor: &str,
    ) -> Result<bool> {
        let result = self.repo.delete_permission(tenant_id, id).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.permission.delete",
            "permission",
            id,
            Severity::High,
            &result,
        );
        result
    }

    pub async fn put_group(&self, group: &mirador_core::rbac::Group, actor: &str) -> Result<()> {
        let result = self.repo.put_group(group).await;
        self.audit_outcome(
            &group.tenant_id,
            actor,
            "rbac.group.put",
            "group",
            &group.name,
            Severity::Medium,
            &result,
        );
        result
    }

    pub async fn delete_group(&self, tenant_id: &str, name: &str, actor: &str) -> Result<bool> {
        let result = self.repo.delete_group(tenant_id, name).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.group.delete",
            "group",
            name,
            Severity::High,
            &result,
        );
        result
    }

    pub async fn create_user(&self, user: &User, actor: &str) -> Result<()> {
        let result = self.repo.create_user(user).await;
        self.audit_outcome("", actor, "rbac.user.create", "user", &user.id, Severity::Medium, &result);
        result
    }

    pub async fn update_user(&self, user: &User, actor: &str) -> Result<()> {
        let result = self.repo.update_user(user).await;
        self.audit_outcome("", actor, "rbac.user.update", "user", &user.id, Severity::Medium, &result);
        result
    }

    pub async fn delete_user(&self, user_id: &str, actor: &str) -> Result<bool> {
        let result = self.repo.delete_user(user_id).await;
        self.audit_outcome("", actor, "rbac.user.delete", "user", user_id, Severity::High, &result);
        result
    }

    pub async fn put_tenant(&self, tenant: &Tenant, actor: &str) -> Result<()> {
        let result = self.repo.put_tenant(tenant).await;
        self.audit_outcome(
            &tenant.id,
            actor,
            "rbac.tenant.put",
            "tenant",
            &tenant.id,
            Severity::Medium,
            &result,
        );
        result
    }

    pub async fn delete_tenant(&self, tenant_id: &str, actor: &str) -> Result<bool> {
        let result = self.repo.delete_tenant(tenant_id).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.tenant.delete",
            "tenant",
            tenant_id,
            Severity::High,
            &result,
        );
        result
    }

    pub async fn upsert_tenant_user(&self, membership: &TenantUser, actor: &str) -> Result<()> {
        let result = self.repo.upsert_tenant_user(membership).await;
        self.audit_outcome(
            &membership.tenant_id,
            actor,
            "rbac.tenant_user.put",
            "tenant_user",
            &membership.user_id,
            Severity::Medium,
            &result,
        );
        result
    }

    pub async fn remove_tenant_user(
        &self,
        tenant_id: &str,
        user_id: &str,
        actor: &str,
    ) -> Result<bool> {
        let result = self.repo.remove_tenant_user(tenant_id, user_id).await;
        self.audit_outcome(
            tenant_id,
            actor,
            "rbac.tenant_user.remove",
            "tenant_user",
            user_id,
            Severity::High,
            &result,
        );
        result
    }

    fn audit_outcome<T>(
        &self,
        tenant_id: &str,
        actor: &str,
        action: &str,
        resource: &str,
        resource_id: &str,
        severity: Severity,
        result: &Result<T>,
    ) {
        let event = match result {
            Ok(_) => AuditEvent::mutation(tenant_id, actor, action, resource, resource_id, severity),
            Err(err) => AuditEvent::failure(tenant_id, actor, action, resource, &err.to_string())
                .with_detail("resourceId", resource_id),
        };
        self.audit.log(event);
    }
}
