//! RBAC administration routes and the permission-check endpoint.
//!
//! Roles, permissions, groups, and role assignments are tenant-scoped;
//! users and tenants are global.

use axum::extract::{Extension, Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use mirador_core::rbac::{
    GlobalRole, Group, Permission, PermissionConditions, PermissionContext, Role, Tenant,
    TenantQuotas, TenantStatus, TenantUser, User, UserStatus,
};
use mirador_core::validation::{validate_membership_status, validate_tenant_role};
use mirador_core::CoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::tenant::{actor_from, TenantId};

pub fn tenant_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/rbac/check", get(check_permission))
        .route("/api/v1/rbac/roles", get(list_roles).post(put_role).put(put_role))
        .route(
            "/api/v1/rbac/roles/{name}",
            get(get_role).delete(delete_role),
        )
        .route(
            "/api/v1/rbac/permissions",
            get(list_permissions).post(put_permission).put(put_permission),
        )
        .route(
            "/api/v1/rbac/permissions/{id}",
            get(get_permission).delete(delete_permission),
        )
        .route("/api/v1/rbac/groups", get(list_groups).post(put_group).put(put_group))
        .route(
            "/api/v1/rbac/groups/{name}",
            get(get_group).delete(delete_group),
        )
        .route("/api/v1/rbac/users/roles", post(assign_roles))
        .route("/api/v1/rbac/users/{id}/roles", get(user_roles))
        .route(
            "/api/v1/rbac/users/{id}/roles/{role}",
            delete(revoke_role),
        )
}

pub fn global_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/rbac/tenants", get(list_tenants).post(put_tenant))
        .route(
            "/api/v1/rbac/tenants/{id}",
            get(get_tenant).put(put_tenant_by_id).delete(delete_tenant),
        )
        .route(
            "/api/v1/rbac/tenants/{id}/users",
            get(list_tenant_users).post(upsert_tenant_user),
        )
        .route(
            "/api/v1/rbac/tenants/{id}/users/{user}",
            delete(remove_tenant_user),
        )
        .route(
            "/api/v1/rbac/users",
            get(list_users).post(create_user).put(update_user),
        )
        .route(
            "/api/v1/rbac/users/{id}",
            get(get_user).delete(delete_user),
        )
}

// ---------------------------------------------------------------------
// Permission check
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

async fn check_permission(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Query(query): Query<CheckQuery>,
) -> ApiResult<Json<CheckResponse>> {
    let mut ctx = PermissionContext::new(&tenant.0, &actor_from(&headers), &query.resource, &query.action);
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        ctx.ip_address = ip.trim().to_string();
    }
    let allowed = state.rbac.check_permission(&ctx).await?;
    Ok(Json(CheckResponse { allowed }))
}

// ---------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub parent_roles: Vec<String>,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

const OK: StatusResponse = StatusResponse { status: "ok" };

async fn list_roles(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
) -> ApiResult<Json<Vec<Role>>> {
    Ok(Json(state.rbac.repo().list_roles(&tenant.0).await?))
}

async fn get_role(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(name): Path<String>,
) -> ApiResult<Json<Role>> {
    state
        .rbac
        .repo()
        .get_role(&tenant.0, &name)
        .await?
        .map(Json)
        .ok_or_else(|| CoreError::not_found("role", name).into())
}

async fn put_role(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Json(body): Json<RoleRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let now = Utc::now();
    let role = Role {
        tenant_id: tenant.0,
        name: body.name,
        description: body.description,
        permissions: body.permissions,
        parent_roles: body.parent_roles,
        is_system: body.is_system,
        created_at: now,
        updated_at: now,
    };
    state.rbac.put_role(&role, &actor_from(&headers)).await?;
    Ok(Json(OK))
}

async fn delete_role(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .rbac
        .delete_role(&tenant.0, &name, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

// ---------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: String,
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub resource_pattern: String,
    #[serde(default)]
    pub conditions: PermissionConditions,
}

async fn list_permissions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
) -> ApiResult<Json<Vec<Permission>>> {
    Ok(Json(state.rbac.repo().list_permissions(&tenant.0).await?))
}

async fn get_permission(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Json<Permission>> {
    state
        .rbac
        .repo()
        .get_permission(&tenant.0, &id)
        .await?
        .map(Json)
        .ok_or_else(|| CoreError::not_found("permission", id).into())
}

async fn put_permission(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Json(body): Json<PermissionRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let permission = Permission {
        tenant_id: tenant.0,
        id: body.id,
        resource: body.resource,
        action: body.action,
        scope: if body.scope.is_empty() {
            "tenant".to_string()
        } else {
            body.scope
        },
        resource_pattern: body.resource_pattern,
        conditions: body.conditions,
    };
    state
        .rbac
        .put_permission(&permission, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

async fn delete_permission(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .rbac
        .delete_permission(&tenant.0, &id, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

// ---------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub parent_groups: Vec<String>,
}

async fn list_groups(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(state.rbac.repo().list_groups(&tenant.0).await?))
}

async fn get_group(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(name): Path<String>,
) -> ApiResult<Json<Group>> {
    state
        .rbac
        .repo()
        .get_group(&tenant.0, &name)
        .await?
        .map(Json)
        .ok_or_else(|| CoreError::not_found("group", name).into())
}

async fn put_group(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Json(body): Json<GroupRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let now = Utc::now();
    let group = Group {
        tenant_id: tenant.0,
        name: body.name,
        members: body.members,
        roles: body.roles,
        parent_groups: body.parent_groups,
        created_at: now,
        updated_at: now,
    };
    state.rbac.put_group(&group, &actor_from(&headers)).await?;
    Ok(Json(OK))
}

async fn delete_group(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .rbac
        .delete_group(&tenant.0, &name, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

// ---------------------------------------------------------------------
// Role assignment
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolesRequest {
    pub user_id: String,
    pub roles: Vec<String>,
}

async fn assign_roles(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Json(body): Json<AssignRolesRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .rbac
        .assign_user_roles(&tenant.0, &body.user_id, &body.roles, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

#[derive(Debug, Serialize)]
pub struct UserRolesResponse {
    pub user_id: String,
    pub roles: Vec<String>,
}

async fn user_roles(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserRolesResponse>> {
    let bindings = state.rbac.repo().user_role_bindings(&tenant.0, &id).await?;
    let now = Utc::now();
    let mut roles: Vec<String> = bindings
        .into_iter()
        .filter(|b| b.is_effective(now))
        .map(|b| b.role_id)
        .collect();
    roles.sort_unstable();
    roles.dedup();
    Ok(Json(UserRolesResponse { user_id: id, roles }))
}

async fn revoke_role(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantId>,
    headers: HeaderMap,
    Path((id, role)): Path<(String, String)>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .rbac
        .revoke_user_role(&tenant.0, &id, &role, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

// ---------------------------------------------------------------------
// Tenants (global)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub admin_email: String,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub quotas: TenantQuotas,
    #[serde(default)]
    pub features: Vec<String>,
}

async fn list_tenants(State(state): State<AppState>) -> ApiResult<Json<Vec<Tenant>>> {
    Ok(Json(state.rbac.repo().list_tenants().await?))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    state
        .rbac
        .repo()
        .get_tenant(&id)
        .await?
        .map(Json)
        .ok_or_else(|| CoreError::not_found("tenant", id).into())
}

async fn save_tenant(
    state: &AppState,
    headers: &HeaderMap,
    id: String,
    body: TenantRequest,
) -> ApiResult<Json<StatusResponse>> {
    let existing = state.rbac.repo().get_tenant(&id).await?;
    let now = Utc::now();
    let tenant = Tenant {
        id,
        name: body.name,
        admin_email: body.admin_email,
        status: existing
            .as_ref()
            .map(|t| t.status)
            .unwrap_or(TenantStatus::Active),
        is_system: body.is_system,
        quotas: body.quotas,
        features: body.features,
        created_at: existing.map(|t| t.created_at).unwrap_or(now),
        updated_at: now,
    };
    state.rbac.put_tenant(&tenant, &actor_from(headers)).await?;
    Ok(Json(OK))
}

async fn put_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TenantRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let id = body
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    save_tenant(&state, &headers, id, body).await
}

async fn put_tenant_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TenantRequest>,
) -> ApiResult<Json<StatusResponse>> {
    save_tenant(&state, &headers, id, body).await
}

async fn delete_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state.rbac.delete_tenant(&id, &actor_from(&headers)).await?;
    Ok(Json(OK))
}

// ---------------------------------------------------------------------
// Tenant memberships (global routes, tenant in path)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUserRequest {
    pub user_id: String,
    pub tenant_role: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub additional_permissions: Vec<String>,
}

async fn list_tenant_users(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TenantUser>>> {
    Ok(Json(state.rbac.repo().list_tenant_users(&id).await?))
}

async fn upsert_tenant_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TenantUserRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let tenant_role = validate_tenant_role(&body.tenant_role)?;
    let status = validate_membership_status(body.status.as_deref().unwrap_or("active"))?;
    let now = Utc::now();
    let membership = TenantUser {
        tenant_id: id,
        user_id: body.user_id,
        tenant_role,
        status,
        additional_permissions: body.additional_permissions,
        metadata: Default::default(),
        created_at: now,
        updated_at: now,
    };
    state
        .rbac
        .upsert_tenant_user(&membership, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

async fn remove_tenant_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, user)): Path<(String, String)>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .rbac
        .remove_tenant_user(&id, &user, &actor_from(&headers))
        .await?;
    Ok(Json(OK))
}

// ---------------------------------------------------------------------
// Users (global)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub global_role: GlobalRole,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.rbac.repo().list_users().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    state
        .rbac
        .repo()
        .get_user(&id)
        .await?
        .map(Json)
        .ok_or_else(|| CoreError::not_found("user", id).into())
}

fn user_from_request(body: UserRequest, id: String, created_at: chrono::DateTime<Utc>) -> User {
    User {
        id,
        email: body.email,
        username: body.username,
        full_name: body.full_name,
        global_role: body.global_role,
        status: body.status.unwrap_or(UserStatus::Active),
        created_at,
        updated_at: Utc::now(),
    }
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let id = body
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user = user_from_request(body, id, Utc::now());
    state.rbac.create_user(&user, &actor_from(&headers)).await?;
    Ok(Json(OK))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UserRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let id = body
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| CoreError::validation("id", "user id is required for updates"))?;
    let created_at = state
        .rbac
        .repo()
        .get_user(&id)
        .await?
        .map(|u| u.created_at)
        .unwrap_or_else(Utc::now);
    let user = user_from_request(body, id, created_at);
    state.rbac.update_user(&user, &actor_from(&headers)).await?;
    Ok(Json(OK))
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state.rbac.delete_user(&id, &actor_from(&headers)).await?;
    Ok(Json(OK))
}
