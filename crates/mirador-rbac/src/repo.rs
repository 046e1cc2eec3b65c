//! RBAC repository: persistence and read-through caching for users,
//! tenants, memberships, roles, permissions, groups, and role bindings.
//!
//! The vector store is authoritative. Roles and permissions are cached
//! for 30 minutes, user-role bindings for 15; every write invalidates the
//! affected keys. Cache failures never fail a request — they are counted
//! on [`CacheStats`] and the read falls through to the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mirador_core::ids::deterministic_id;
use mirador_core::rbac::{
    GlobalRole, Group, Permission, Role, RoleBinding, SubjectType, Tenant, TenantUser, User,
    UserStatus,
};
use mirador_core::validation::{
    validate_description, validate_email, validate_permission_spec, validate_role_name,
    validate_tenant_id, validate_tenant_name,
};
use mirador_core::{CoreError, Result};
use mirador_store::{
    is_missing_class, schema, DynMetadataCache, DynVectorBackend, QuerySpec, SchemaBootstrap,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Cache TTLs per the read-through policy.
pub const ROLE_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const USER_ROLE_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
pub const PERMISSION_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Listing cap for repository scans.
const LIST_LIMIT: usize = 1000;

const USER_CLASS: &str = "RbacUser";
const TENANT_CLASS: &str = "RbacTenant";
const TENANT_USER_CLASS: &str = "RbacTenantUser";
const ROLE_CLASS: &str = "RbacRole";
const PERMISSION_CLASS: &str = "RbacPermission";
const GROUP_CLASS: &str = "RbacGroup";
const BINDING_CLASS: &str = "RbacRoleBinding";

/// Scope component used in deterministic ids for global entities.
const GLOBAL_SCOPE: &str = "";

/// Counters for cache behavior; surfaced as Prometheus metrics by the API
/// layer.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Repository over the vector backend with read-through caching.
pub struct RbacRepository {
    backend: Arc<DynVectorBackend>,
    bootstrap: Arc<SchemaBootstrap>,
    cache: Arc<DynMetadataCache>,
    stats: Arc<CacheStats>,
}

impl RbacRepository {
    pub fn new(
        backend: Arc<DynVectorBackend>,
        bootstrap: Arc<SchemaBootstrap>,
        cache: Arc<DynMetadataCache>,
    ) -> Self {
        Self {
            backend,
            bootstrap,
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn cache_stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    // ------------------------------------------------------------------
    // Users (global)
    // ------------------------------------------------------------------

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.fetch_one(
            self.query(USER_CLASS).where_text("userId", user_id).limit(1),
        )
        .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one(self.query(USER_CLASS).where_text("email", email).limit(1))
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.fetch_all(self.query(USER_CLASS).sort_asc("email").limit(LIST_LIMIT))
            .await
    }

    /// Active users holding the global_admin role.
    pub async fn count_global_admins(&self) -> Result<i64> {
        let spec = self
            .query(USER_CLASS)
            .where_text("globalRole", GlobalRole::GlobalAdmin.as_str())
            .where_text("status", UserStatus::Active.as_str());
        match self.backend.count(&spec).await {
            Ok(Some(count)) => Ok(count),
            Ok(None) => Ok(self.rows(&spec.limit(LIST_LIMIT)).await?.len() as i64),
            Err(err) if is_missing_class(&err) => Ok(0),
            Err(err) => Err(err),
        }
    }

    pub async fn create_user(&self, user: &User) -> Result<()> {
        validate_email(&user.email, "email")?;
        if let Some(existing) = self.find_user_by_email(&user.email).await? {
            if existing.id != user.id {
                return Err(CoreError::validation(
                    "email",
                    format!("email '{}' is already registered", user.email),
                ));
            }
        }
        self.put(USER_CLASS, GLOBAL_SCOPE, &[&user.id], user).await
    }

    /// Update a user, enforcing the global-admin floor: a change that
    /// would leave zero active global admins is rejected before any write.
    pub async fn update_user(&self, user: &User) -> Result<()> {
        validate_email(&user.email, "email")?;
        let existing = self
            .get_user(&user.id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", user.id.clone()))?;

        let was_active_admin =
            existing.global_role == GlobalRole::GlobalAdmin && existing.status == UserStatus::Active;
        let stays_active_admin =
            user.global_role == GlobalRole::GlobalAdmin && user.status == UserStatus::Active;
        if was_active_admin && !stays_active_admin && self.count_global_admins().await? <= 1 {
            return Err(CoreError::validation(
                "globalRole",
                "cannot demote or suspend the last active global admin",
            ));
        }

        self.put(USER_CLASS, GLOBAL_SCOPE, &[&user.id], user).await
    }

    /// Delete a user, enforcing the global-admin floor.
    pub async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let Some(existing) = self.get_user(user_id).await? else {
            return Ok(false);
        };
        if existing.global_role == GlobalRole::GlobalAdmin
            && existing.status == UserStatus::Active
            && self.count_global_admins().await? <= 1
        {
            return Err(CoreError::validation(
                "globalRole",
                "cannot delete the last active global admin",
            ));
        }
        let id = deterministic_id(USER_CLASS, GLOBAL_SCOPE, &[user_id]);
        self.backend.delete_object(USER_CLASS, id).await
    }

    // ------------------------------------------------------------------
    // Tenants (global)
    // ------------------------------------------------------------------

    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        self.fetch_one(
            self.query(TENANT_CLASS)
                .where_text("tenantId", tenant_id)
                .limit(1),
        )
        .await
    }

    pub async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        self.fetch_one(self.query(TENANT_CLASS).where_text("name", name).limit(1))
            .await
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.fetch_all(self.query(TENANT_CLASS).sort_asc("name").limit(LIST_LIMIT))
            .await
    }

    pub async fn put_tenant(&self, tenant: &Tenant) -> Result<()> {
        validate_tenant_name(&tenant.name)?;
        validate_email(&tenant.admin_email, "adminEmail")?;
        if let Some(existing) = self.find_tenant_by_name(&tenant.name).await? {
            if existing.id != tenant.id {
                return Err(CoreError::validation(
                    "name",
                    format!("tenant name '{}' is already taken", tenant.name),
                ));
            }
        }
        self.put(TENANT_CLASS, GLOBAL_SCOPE, &[&tenant.id], tenant)
            .await
    }

    /// Delete a tenant. System tenants are protected.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<bool> {
        let Some(existing) = self.get_tenant(tenant_id).await? else {
            return Ok(false);
        };
        if existing.is_system {
            return Err(CoreError::validation(
                "isSystem",
                format!("tenant '{tenant_id}' is a system tenant and cannot be deleted"),
            ));
        }
        let id = deterministic_id(TENANT_CLASS, GLOBAL_SCOPE, &[tenant_id]);
        self.backend.delete_object(TENANT_CLASS, id).await
    }

    // ------------------------------------------------------------------
    // Tenant memberships
    // ------------------------------------------------------------------

    pub async fn get_tenant_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<TenantUser>> {
        self.fetch_one(
            self.query(TENANT_USER_CLASS)
                .where_text("tenantId", tenant_id)
                .where_text("userId", user_id)
                .limit(1),
        )
        .await
    }

    pub async fn list_tenant_users(&self, tenant_id: &str) -> Result<Vec<TenantUser>> {
        validate_tenant_id(tenant_id)?;
        self.fetch_all(
            self.query(TENANT_USER_CLASS)
                .where_text("tenantId", tenant_id)
                .sort_asc("userId")
                .limit(LIST_LIMIT),
        )
        .await
    }

    pub async fn upsert_tenant_user(&self, membership: &TenantUser) -> Result<()> {
        validate_tenant_id(&membership.tenant_id)?;
        self.put(
            TENANT_USER_CLASS,
            &membership.tenant_id,
            &[&membership.user_id],
            membership,
        )
        .await?;
        // The membership's tenant role feeds permission collection.
        self.invalidate_user_roles(&membership.tenant_id, &membership.user_id)
            .await;
        Ok(())
    }

    pub async fn remove_tenant_user(&self, tenant_id: &str, user_id: &str) -> Result<bool> {
        let id = deterministic_id(TENANT_USER_CLASS, tenant_id, &[user_id]);
        let found = self.backend.delete_object(TENANT_USER_CLASS, id).await?;
        self.invalidate_user_roles(tenant_id, user_id).await;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub async fn get_role(&self, tenant_id: &str, name: &str) -> Result<Option<Role>> {
        let key = format!("rbac:role:{tenant_id}:{name}");
        if let Some(role) = self.cache_get::<Role>(&key).await {
            return Ok(Some(role));
        }
        let role = self.get_role_uncached(tenant_id, name).await?;
        if let Some(role) = &role {
            self.cache_put(&key, role, ROLE_CACHE_TTL).await;
        }
        Ok(role)
    }

    async fn get_role_uncached(&self, tenant_id: &str, name: &str) -> Result<Option<Role>> {
        self.fetch_one(
            self.query(ROLE_CLASS)
                .where_text("tenantId", tenant_id)
                .where_text("name", name)
                .limit(1),
        )
        .await
    }

    pub async fn list_roles(&self, tenant_id: &str) -> Result<Vec<Role>> {
        validate_tenant_id(tenant_id)?;
        self.fetch_all(
            self.query(ROLE_CLASS)
                .where_text("tenantId", tenant_id)
                .sort_asc("name")
                .limit(LIST_LIMIT),
        )
        .await
    }

    /// Create or update a role. System roles are immutable; a role naming
    /// itself as parent is rejected here, wider cycles are rejected at
    /// assignment time where the whole graph is in view.
    pub async fn put_role(&self, role: &Role) -> Result<()> {
        validate_tenant_id(&role.tenant_id)?;
        validate_role_name(&role.name)?;
        validate_description(&role.description)?;
        for spec in &role.permissions {
            validate_permission_spec(spec)?;
        }
        if role.parent_roles.iter().any(|p| p == &role.name) {
            return Err(CoreError::validation(
                "parentRoles",
                "a role cannot be its own parent",
            ));
        }
        if let Some(existing) = self.get_role_uncached(&role.tenant_id, &role.name).await? {
            if existing.is_system {
                return Err(CoreError::validation(
                    "isSystem",
                    format!("role '{}' is a system role and cannot be modified", role.name),
                ));
            }
        }

        self.put(ROLE_CLASS, &role.tenant_id, &[&role.name], role)
            .await?;
        self.cache_del(&format!("rbac:role:{}:{}", role.tenant_id, role.name))
            .await;
        Ok(())
    }

    /// Delete a role. Rejected for system roles and while any subject
    /// still holds the role.
    pub async fn delete_role(&self, tenant_id: &str, name: &str) -> Result<bool> {
        let Some(existing) = self.get_role_uncached(tenant_id, name).await? else {
            return Ok(false);
        };
        if existing.is_system {
            return Err(CoreError::validation(
                "isSystem",
                format!("role '{name}' is a system role and cannot be deleted"),
            ));
        }
        let holders = self.users_holding_role(tenant_id, name).await?;
        if !holders.is_empty() {
            return Err(CoreError::validation(
                "name",
                format!(
                    "role '{name}' is still assigned to {} subject(s)",
                    holders.len()
                ),
            ));
        }

        let id = deterministic_id(ROLE_CLASS, tenant_id, &[name]);
        let found = self.backend.delete_object(ROLE_CLASS, id).await?;
        self.cache_del(&format!("rbac:role:{tenant_id}:{name}")).await;
        Ok(found)
    }

    /// Parent adjacency over every role in the tenant.
    pub async fn role_parent_graph(&self, tenant_id: &str) -> Result<HashMap<String, Vec<String>>> {
        Ok(self
            .list_roles(tenant_id)
            .await?
            .into_iter()
            .map(|r| (r.name, r.parent_roles))
            .collect())
    }

    /// Reverse lookup: all user ids that hold `role`, either through an
    /// explicit binding or as their built-in tenant role.
    pub async fn users_holding_role(&self, tenant_id: &str, role: &str) -> Result<Vec<String>> {
        let bindings: Vec<RoleBinding> = self
            .fetch_all(
                self.query(BINDING_CLASS)
                    .where_text("tenantId", tenant_id)
                    .where_text("roleId", role)
                    .where_text("subjectType", SubjectType::User.as_str())
                    .limit(LIST_LIMIT),
            )
            .await?;
        let memberships: Vec<TenantUser> = self
            .fetch_all(
                self.query(TENANT_USER_CLASS)
                    .where_text("tenantId", tenant_id)
                    .where_text("tenantRole", role)
                    .limit(LIST_LIMIT),
            )
            .await?;

        let mut holders: Vec<String> = bindings
            .into_iter()
            .map(|b| b.subject_id)
            .chain(memberships.into_iter().map(|m| m.user_id))
            .collect();
        holders.sort_unstable();
        holders.dedup();
        Ok(holders)
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    pub async fn get_permission(&self, tenant_id: &str, id: &str) -> Result<Option<Permission>> {
        let key = format!("rbac:perm:{tenant_id}:{id}");
        if let Some(permission) = self.cache_get::<Permission>(&key).await {
            return Ok(Some(permission));
        }
        let permission: Option<Permission> = self
            .fetch_one(
                self.query(PERMISSION_CLASS)
                    .where_text("tenantId", tenant_id)
                    .where_text("permissionId", id)
                    .limit(1),
            )
            .await?;
        if let Some(permission) = &permission {
            self.cache_put(&key, permission, PERMISSION_CACHE_TTL).await;
        }
        Ok(permission)
    }

    pub async fn list_permissions(&self, tenant_id: &str) -> Result<Vec<Permission>> {
        validate_tenant_id(tenant_id)?;
        self.fetch_all(
            self.query(PERMISSION_CLASS)
                .where_text("tenantId", tenant_id)
                .sort_asc("permissionId")
                .limit(LIST_LIMIT),
        )
        .await
    }

    pub async fn put_permission(&self, permission: &Permission) -> Result<()> {
        validate_tenant_id(&permission.tenant_id)?;
        if permission.resource.trim().is_empty() {
            return Err(CoreError::validation("resource", "resource is required"));
        }
        if permission.action.trim().is_empty() {
            return Err(CoreError::validation("action", "action is required"));
        }
        self.put(
            PERMISSION_CLASS,
            &permission.tenant_id,
            &[&permission.id],
            permission,
        )
        .await?;
        self.cache_del(&format!(
            "rbac:perm:{}:{}",
            permission.tenant_id, permission.id
        ))
        .await;
        Ok(())
    }

    pub async fn delete_permission(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let object_id = deterministic_id(PERMISSION_CLASS, tenant_id, &[id]);
        let found = self.backend.delete_object(PERMISSION_CLASS, object_id).await?;
        self.cache_del(&format!("rbac:perm:{tenant_id}:{id}")).await;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub async fn get_group(&self, tenant_id: &str, name: &str) -> Result<Option<Group>> {
        self.fetch_one(
            self.query(GROUP_CLASS)
                .where_text("tenantId", tenant_id)
                .where_text("name", name)
                .limit(1),
        )
        .await
    }

    pub async fn list_groups(&self, tenant_id: &str) -> Result<Vec<Group>> {
        validate_tenant_id(tenant_id)?;
        self.fetch_all(
            self.query(GROUP_CLASS)
                .where_text("tenantId", tenant_id)
                .sort_asc("name")
                .limit(LIST_LIMIT),
        )
        .await
    }

    /// Groups the user belongs to directly.
    pub async fn user_groups(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Group>> {
        self.fetch_all(
            self.query(GROUP_CLASS)
                .where_text("tenantId", tenant_id)
                .where_text("members", user_id)
                .limit(LIST_LIMIT),
        )
        .await
    }

    pub async fn put_group(&self, group: &Group) -> Result<()> {
        validate_tenant_id(&group.tenant_id)?;
        validate_role_name(&group.name)?;
        if group.parent_groups.iter().any(|p| p == &group.name) {
            return Err(CoreError::validation(
                "parentGroups",
                "a group cannot be its own parent",
            ));
        }
        self.put(GROUP_CLASS, &group.tenant_id, &[&group.name], group)
            .await?;
        for member in &group.members {
            self.invalidate_user_roles(&group.tenant_id, member).await;
        }
        Ok(())
    }

    pub async fn delete_group(&self, tenant_id: &str, name: &str) -> Result<bool> {
        let existing = self.get_group(tenant_id, name).await?;
        let id = deterministic_id(GROUP_CLASS, tenant_id, &[name]);
        let found = self.backend.delete_object(GROUP_CLASS, id).await?;
        if let Some(group) = existing {
            for member in &group.members {
                self.invalidate_user_roles(tenant_id, member).await;
            }
        }
        Ok(found)
    }

    pub async fn group_parent_graph(&self, tenant_id: &str) -> Result<HashMap<String, Vec<String>>> {
        Ok(self
            .list_groups(tenant_id)
            .await?
            .into_iter()
            .map(|g| (g.name, g.parent_groups))
            .collect())
    }

    // ------------------------------------------------------------------
    // Role bindings
    // ------------------------------------------------------------------

    /// Explicit role bindings for a user, cached for 15 minutes.
    /// Validity windows are evaluated by the caller against request time.
    pub async fn user_role_bindings(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<RoleBinding>> {
        let key = user_roles_key(tenant_id, user_id);
        if let Some(bindings) = self.cache_get::<Vec<RoleBinding>>(&key).await {
            return Ok(bindings);
        }
        let bindings: Vec<RoleBinding> = self
            .fetch_all(
                self.query(BINDING_CLASS)
                    .where_text("tenantId", tenant_id)
                    .where_text("subjectType", SubjectType::User.as_str())
                    .where_text("subjectId", user_id)
                    .limit(LIST_LIMIT),
            )
            .await?;
        self.cache_put(&key, &bindings, USER_ROLE_CACHE_TTL).await;
        Ok(bindings)
    }

    /// Assign roles to a user. Every role must exist and the combined
    /// parent graph must be acyclic; on any failure nothing is recorded.
    pub async fn assign_user_roles(
        &self,
        tenant_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> Result<()> {
        validate_tenant_id(tenant_id)?;
        if roles.is_empty() {
            return Err(CoreError::validation("roles", "at least one role is required"));
        }

        let graph = self.role_parent_graph(tenant_id).await?;
        for role in roles {
            if !graph.contains_key(role) {
                return Err(CoreError::validation(
                    "roles",
                    format!("unknown role '{role}'"),
                ));
            }
            if let Some(cycle) = crate::graph::find_cycle(&graph, role) {
                return Err(CoreError::validation(
                    "roles",
                    format!("circular dependency: {}", cycle.join(" -> ")),
                ));
            }
        }

        for role in roles {
            let binding = RoleBinding {
                tenant_id: tenant_id.to_string(),
                subject_type: SubjectType::User,
                subject_id: user_id.to_string(),
                role_id: role.clone(),
                scope: "tenant".to_string(),
                resource_id: String::new(),
                precedence: 0,
                expires_at: None,
                not_before: None,
                conditions: Default::default(),
            };
            self.put(
                BINDING_CLASS,
                tenant_id,
                &["user", user_id, role],
                &binding,
            )
            .await?;
        }
        self.invalidate_user_roles(tenant_id, user_id).await;
        Ok(())
    }

    pub async fn revoke_user_role(
        &self,
        tenant_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<bool> {
        let id = deterministic_id(BINDING_CLASS, tenant_id, &["user", user_id, role]);
        let found = self.backend.delete_object(BINDING_CLASS, id).await?;
        self.invalidate_user_roles(tenant_id, user_id).await;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn query(&self, class: &'static str) -> QuerySpec {
        let fields: Vec<&'static str> = schema::class_definition(class)
            .map(|def| def.properties.iter().map(|p| p.name).collect())
            .unwrap_or_default();
        QuerySpec::new(class).fields(fields)
    }

    async fn rows(&self, spec: &QuerySpec) -> Result<Vec<Value>> {
        match self.backend.query(spec).await {
            Ok(rows) => Ok(rows),
            Err(err) if is_missing_class(&err) => {
                warn!(class = %spec.class, "backing class missing; treating as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_one<T: DeserializeOwned>(&self, spec: QuerySpec) -> Result<Option<T>> {
        let rows = self.rows(&spec).await?;
        match rows.first() {
            Some(row) => Ok(Some(serde_json::from_value(row.clone())?)),
            None => Ok(None),
        }
    }

    async fn fetch_all<T: DeserializeOwned>(&self, spec: QuerySpec) -> Result<Vec<T>> {
        let rows = self.rows(&spec).await?;
        rows.iter()
            .map(|row| serde_json::from_value(row.clone()).map_err(Into::into))
            .collect()
    }

    async fn put<T: Serialize>(
        &self,
        class: &str,
        tenant_id: &str,
        key_parts: &[&str],
        entity: &T,
    ) -> Result<()> {
        self.bootstrap.ensure(self.backend.as_ref()).await?;
        let id = deterministic_id(class, tenant_id, key_parts);
        self.backend
            .put_object(class, id, serde_json::to_value(entity)?)
            .await
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(err) => {
                    debug!(key, error = %err, "dropping undecodable cache entry");
                    self.cache_del(key).await;
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %err, "cache read failed");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(raw) = serde_json::to_string(value) else {
            return;
        };
        if let Err(err) = self.cache.set(key, &raw, ttl).await {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %err, "cache write failed");
        }
    }

    async fn cache_del(&self, key: &str) {
        if let Err(err) = self.cache.delete(key).await {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %err, "cache invalidation failed");
        }
    }

    async fn invalidate_user_roles(&self, tenant_id: &str, user_id: &str) {
        self.cache_del(&user_roles_key(tenant_id, user_id)).await;
    }
}

fn user_roles_key(tenant_id: &str, user_id: &str) -> String {
    format!("rbac:user_roles:{tenant_id}:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mirador_core::rbac::{MembershipStatus, TenantRole, TenantStatus};
    use mirador_store::{MemoryCache, MemoryStore};

    fn repo() -> RbacRepository {
        RbacRepository::new(
            Arc::new(MemoryStore::new()),
            SchemaBootstrap::new(),
            Arc::new(MemoryCache::new()),
        )
    }

    fn user(id: &str, email: &str, global_role: GlobalRole) -> User {
        User {
            id: id.into(),
            email: email.into(),
            username: id.into(),
            full_name: String::new(),
            global_role,
            status: UserStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn role(tenant: &str, name: &str, parents: &[&str]) -> Role {
        Role {
            tenant_id: tenant.into(),
            name: name.into(),
            description: String::new(),
            permissions: vec!["dashboard:read".into()],
            parent_roles: parents.iter().map(|p| p.to_string()).collect(),
            is_system: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn membership(tenant: &str, user: &str, tenant_role: TenantRole) -> TenantUser {
        TenantUser {
            tenant_id: tenant.into(),
            user_id: user.into(),
            tenant_role,
            status: MembershipStatus::Active,
            additional_permissions: vec![],
            metadata: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn user_crud_and_email_uniqueness() {
        let repo = repo();
        repo.create_user(&user("u1", "a@example.com", GlobalRole::None))
            .await
            .unwrap();

        let fetched = repo.get_user("u1").await.unwrap().unwrap();
        assert_eq!(fetched.email, "a@example.com");

        let err = repo
            .create_user(&user("u2", "a@example.com", GlobalRole::None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn global_admin_floor_on_update_and_delete() {
        let repo = repo();
        repo.create_user(&user("admin", "admin@example.com", GlobalRole::GlobalAdmin))
            .await
            .unwrap();
        assert_eq!(repo.count_global_admins().await.unwrap(), 1);

        let mut demoted = user("admin", "admin@example.com", GlobalRole::None);
        demoted.created_at = Utc::now();
        let err = repo.update_user(&demoted).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "globalRole"));
        assert_eq!(repo.count_global_admins().await.unwrap(), 1);

        let err = repo.delete_user("admin").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "globalRole"));

        // With a second admin, demotion goes through.
        repo.create_user(&user("admin2", "admin2@example.com", GlobalRole::GlobalAdmin))
            .await
            .unwrap();
        repo.update_user(&demoted).await.unwrap();
        assert_eq!(repo.count_global_admins().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn system_tenant_cannot_be_deleted() {
        let repo = repo();
        let tenant = Tenant {
            id: "system".into(),
            name: "platform system".into(),
            admin_email: "root@example.com".into(),
            status: TenantStatus::Active,
            is_system: true,
            quotas: Default::default(),
            features: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.put_tenant(&tenant).await.unwrap();

        let err = repo.delete_tenant("system").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "isSystem"));
        assert!(repo.get_tenant("system").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tenant_name_uniqueness_and_shape() {
        let repo = repo();
        let mut tenant = Tenant {
            id: "t1".into(),
            name: "acme corp".into(),
            admin_email: "ops@acme.io".into(),
            status: TenantStatus::Active,
            is_system: false,
            quotas: Default::default(),
            features: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.put_tenant(&tenant).await.unwrap();

        tenant.id = "t2".into();
        let err = repo.put_tenant(&tenant).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "name"));

        tenant.name = "x!".into();
        assert!(repo.put_tenant(&tenant).await.is_err());
    }

    #[tokio::test]
    async fn system_role_is_immutable_and_undeletable() {
        let repo = repo();
        let mut system_role = role("t1", "tenant_admin", &[]);
        system_role.is_system = true;
        repo.put_role(&system_role).await.unwrap();

        let err = repo.put_role(&role("t1", "tenant_admin", &[])).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "isSystem"));

        let err = repo.delete_role("t1", "tenant_admin").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "isSystem"));
    }

    #[tokio::test]
    async fn delete_role_rejected_while_held() {
        let repo = repo();
        repo.put_role(&role("t1", "viewer", &[])).await.unwrap();
        repo.assign_user_roles("t1", "u1", &["viewer".into()])
            .await
            .unwrap();

        let err = repo.delete_role("t1", "viewer").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));

        repo.revoke_user_role("t1", "u1", "viewer").await.unwrap();
        assert!(repo.delete_role("t1", "viewer").await.unwrap());
    }

    #[tokio::test]
    async fn holders_include_builtin_tenant_roles() {
        let repo = repo();
        repo.upsert_tenant_user(&membership("t1", "u9", TenantRole::TenantEditor))
            .await
            .unwrap();
        let holders = repo.users_holding_role("t1", "tenant_editor").await.unwrap();
        assert_eq!(holders, vec!["u9"]);
    }

    #[tokio::test]
    async fn assignment_rejects_unknown_role_and_cycles() {
        let repo = repo();
        // Mutual parents: creation succeeds (forward references are
        // allowed), assignment must fail.
        repo.put_role(&role("t1", "roleA", &["roleB"])).await.unwrap();
        repo.put_role(&role("t1", "roleB", &["roleA"])).await.unwrap();

        let err = repo
            .assign_user_roles("t1", "u1", &["roleA".into()])
            .await
            .unwrap_err();
        match err {
            CoreError::Validation { field, message } => {
                assert_eq!(field, "roles");
                assert!(message.contains("circular dependency"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was recorded.
        assert!(repo.user_role_bindings("t1", "u1").await.unwrap().is_empty());

        let err = repo
            .assign_user_roles("t1", "u1", &["ghost".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "roles"));
    }

    #[tokio::test]
    async fn role_cache_read_through_and_invalidation() {
        let repo = repo();
        repo.put_role(&role("t1", "viewer", &[])).await.unwrap();

        // First read misses, second hits.
        repo.get_role("t1", "viewer").await.unwrap().unwrap();
        repo.get_role("t1", "viewer").await.unwrap().unwrap();
        assert!(repo.cache_stats().hits() >= 1);

        // A write invalidates; the next read sees the new description.
        let mut updated = role("t1", "viewer", &[]);
        updated.description = "read-only".into();
        repo.put_role(&updated).await.unwrap();
        let fetched = repo.get_role("t1", "viewer").await.unwrap().unwrap();
        assert_eq!(fetched.description, "read-only");
    }

    #[tokio::test]
    async fn self_parent_rejected_at_creation() {
        let repo = repo();
        let err = repo.put_role(&role("t1", "loop", &["loop"])).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field, .. } if field == "parentRoles"));
    }

    #[tokio::test]
    async fn user_group_membership_lookup() {
        let repo = repo();
        let group = Group {
            tenant_id: "t1".into(),
            name: "sre".into(),
            members: vec!["u1".into(), "u2".into()],
            roles: vec!["viewer".into()],
            parent_groups: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.put_group(&group).await.unwrap();

        let groups = repo.user_groups("t1", "u1").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "sre");
        assert!(repo.user_groups("t1", "u3").await.unwrap().is_empty());
    }
}
