//! End-to-end RBAC scenarios against the in-memory backend: the
//! permission-check hierarchy, constraint denials, the global-admin
//! floor, cycle rejection at assignment, and audit emission.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mirador_core::rbac::{
    GlobalRole, Group, MembershipStatus, Permission, PermissionContext, Role, TenantRole,
    TenantUser, User, UserStatus,
};
use mirador_core::CoreError;
use mirador_rbac::{AuditConfig, AuditEvent, AuditResult, AuditSink, RbacEngine, RbacRepository, Severity};
use mirador_store::{MemoryCache, MemoryStore, SchemaBootstrap};
use tokio::sync::mpsc;

struct Harness {
    engine: RbacEngine,
    repo: Arc<RbacRepository>,
    events: mpsc::Receiver<AuditEvent>,
}

fn harness() -> Harness {
    let repo = Arc::new(RbacRepository::new(
        Arc::new(MemoryStore::new()),
        SchemaBootstrap::new(),
        Arc::new(MemoryCache::new()),
    ));
    let (sink, events) = AuditSink::new(&AuditConfig {
        buffer_size: 256,
        flush_interval_ms: 1000,
    });
    Harness {
        engine: RbacEngine::new(Arc::clone(&repo), sink),
        repo,
        events,
    }
}

fn user(id: &str, global_role: GlobalRole) -> User {
    User {
        id: id.into(),
        email: format!("{id}@example.com"),
        username: id.into(),
        full_name: String::new(),
        global_role,
        status: UserStatus::Active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn membership(tenant: &str, user: &str, role: TenantRole) -> TenantUser {
    TenantUser {
        tenant_id: tenant.into(),
        user_id: user.into(),
        tenant_role: role,
        status: MembershipStatus::Active,
        additional_permissions: vec![],
        metadata: Default::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn role(tenant: &str, name: &str, permissions: &[&str], parents: &[&str]) -> Role {
    Role {
        tenant_id: tenant.into(),
        name: name.into(),
        description: String::new(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        parent_roles: parents.iter().map(|p| p.to_string()).collect(),
        is_system: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Drain buffered audit events and return the ones matching `action`.
fn drain_events(events: &mut mpsc::Receiver<AuditEvent>, action: &str) -> Vec<AuditEvent> {
    let mut matching = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.action == action {
            matching.push(event);
        }
    }
    matching
}

#[tokio::test]
async fn permission_allow_scenario_with_audit() {
    let mut h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "u1", TenantRole::TenantGuest))
        .await
        .unwrap();
    h.repo
        .put_role(&role("t1", "viewer", &["dashboard:read"], &[]))
        .await
        .unwrap();
    h.repo
        .assign_user_roles("t1", "u1", &["viewer".into()])
        .await
        .unwrap();

    let ctx = PermissionContext::new("t1", "u1", "dashboard", "read");
    assert!(h.engine.check_permission(&ctx).await.unwrap());

    let checks = drain_events(&mut h.events, "rbac.check");
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].result, AuditResult::Allowed);
    assert_eq!(checks[0].severity, Severity::Low);
    assert_eq!(checks[0].retention_class, "standard");
}

#[tokio::test]
async fn role_permissions_reach_beyond_builtin_grants() {
    let mut h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "u1", TenantRole::TenantGuest))
        .await
        .unwrap();

    // Guests get no alert permissions built in.
    let ctx = PermissionContext::new("t1", "u1", "alerts", "ack");
    assert!(!h.engine.check_permission(&ctx).await.unwrap());

    h.repo
        .put_role(&role("t1", "escalation", &["alerts:ack"], &[]))
        .await
        .unwrap();
    h.repo
        .assign_user_roles("t1", "u1", &["escalation".into()])
        .await
        .unwrap();
    assert!(h.engine.check_permission(&ctx).await.unwrap());
    drain_events(&mut h.events, "rbac.check");
}

#[tokio::test]
async fn constraint_denial_scenario_with_audit() {
    let mut h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "u1", TenantRole::TenantGuest))
        .await
        .unwrap();

    // Business-hours-only permission, resolved through the registry so
    // its conditions apply.
    let mut office_hours = Permission::from_spec("t1", "alerts:ack").unwrap();
    office_hours.conditions.time_based.allowed_hours = vec!["09:00-17:00".into()];
    h.repo.put_permission(&office_hours).await.unwrap();
    h.repo
        .put_role(&role("t1", "escalation", &["alerts:ack"], &[]))
        .await
        .unwrap();
    h.repo
        .assign_user_roles("t1", "u1", &["escalation".into()])
        .await
        .unwrap();

    let mut ctx = PermissionContext::new("t1", "u1", "alerts", "ack");
    ctx.request_time = Utc.with_ymd_and_hms(2026, 3, 4, 20, 0, 0).unwrap();
    assert!(!h.engine.check_permission(&ctx).await.unwrap());

    let checks = drain_events(&mut h.events, "rbac.check");
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].result, AuditResult::Denied);
    assert_eq!(checks[0].severity, Severity::Medium);

    // Inside the window the same permission allows.
    ctx.request_time = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
    assert!(h.engine.check_permission(&ctx).await.unwrap());
}

#[tokio::test]
async fn global_admin_floor_scenario() {
    let h = harness();
    h.repo
        .create_user(&user("root", GlobalRole::GlobalAdmin))
        .await
        .unwrap();

    let mut demoted = user("root", GlobalRole::None);
    demoted.email = "root@example.com".into();
    let err = h.engine.update_user(&demoted, "root").await.unwrap_err();
    match err {
        CoreError::Validation { field, .. } => assert_eq!(field, "globalRole"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.repo.count_global_admins().await.unwrap(), 1);
}

#[tokio::test]
async fn global_roles_short_circuit() {
    let mut h = harness();
    h.repo
        .create_user(&user("root", GlobalRole::GlobalAdmin))
        .await
        .unwrap();
    h.repo
        .create_user(&user("ta", GlobalRole::GlobalTenantAdmin))
        .await
        .unwrap();

    // global_admin passes without any tenant membership.
    let ctx = PermissionContext::new("t1", "root", "anything", "delete");
    assert!(h.engine.check_permission(&ctx).await.unwrap());

    // global_tenant_admin passes only for admin actions.
    let ctx = PermissionContext::new("t1", "ta", "rbac", "update");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
    let ctx = PermissionContext::new("t1", "ta", "dashboard", "read");
    assert!(!h.engine.check_permission(&ctx).await.unwrap());

    // Unknown users are denied outright.
    let ctx = PermissionContext::new("t1", "ghost", "dashboard", "read");
    assert!(!h.engine.check_permission(&ctx).await.unwrap());
    drain_events(&mut h.events, "rbac.check");
}

#[tokio::test]
async fn inactive_membership_is_denied() {
    let h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    let mut m = membership("t1", "u1", TenantRole::TenantAdmin);
    m.status = MembershipStatus::Suspended;
    h.repo.upsert_tenant_user(&m).await.unwrap();

    let ctx = PermissionContext::new("t1", "u1", "dashboard", "read");
    assert!(!h.engine.check_permission(&ctx).await.unwrap());
}

#[tokio::test]
async fn role_cycle_rejected_at_assignment_with_audit() {
    let mut h = harness();
    h.repo
        .put_role(&role("t1", "roleA", &["dashboard:read"], &["roleB"]))
        .await
        .unwrap();
    h.repo
        .put_role(&role("t1", "roleB", &["dashboard:write"], &["roleA"]))
        .await
        .unwrap();

    let err = h
        .engine
        .assign_user_roles("t1", "u1", &["roleA".into()], "admin")
        .await
        .unwrap_err();
    match err {
        CoreError::Validation { field, message } => {
            assert_eq!(field, "roles");
            assert!(message.contains("circular dependency"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.repo.user_role_bindings("t1", "u1").await.unwrap().is_empty());

    let failures = drain_events(&mut h.events, "rbac.roles.assign");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].result, AuditResult::Error);
    assert_eq!(failures[0].severity, Severity::High);
}

#[tokio::test]
async fn evaluation_terminates_on_cyclic_graph_via_groups() {
    let h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "u1", TenantRole::TenantGuest))
        .await
        .unwrap();
    // Mutually-parented roles reach evaluation through a group grant,
    // which skips assignment validation.
    h.repo
        .put_role(&role("t1", "roleA", &["alerts:ack"], &["roleB"]))
        .await
        .unwrap();
    h.repo
        .put_role(&role("t1", "roleB", &["alerts:mute"], &["roleA"]))
        .await
        .unwrap();
    let group = Group {
        tenant_id: "t1".into(),
        name: "oncall".into(),
        members: vec!["u1".into()],
        roles: vec!["roleA".into()],
        parent_groups: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    h.repo.put_group(&group).await.unwrap();

    // Terminates despite the cycle, and both roles' grants are visible.
    let ctx = PermissionContext::new("t1", "u1", "alerts", "ack");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
    let ctx = PermissionContext::new("t1", "u1", "alerts", "mute");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
}

#[tokio::test]
async fn group_parent_chain_grants_roles() {
    let h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "u1", TenantRole::TenantGuest))
        .await
        .unwrap();
    h.repo
        .put_role(&role("t1", "deployer", &["deploy:run"], &[]))
        .await
        .unwrap();

    let parent = Group {
        tenant_id: "t1".into(),
        name: "platform".into(),
        members: vec![],
        roles: vec!["deployer".into()],
        parent_groups: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let child = Group {
        tenant_id: "t1".into(),
        name: "platform-oncall".into(),
        members: vec!["u1".into()],
        roles: vec![],
        parent_groups: vec!["platform".into()],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    h.repo.put_group(&parent).await.unwrap();
    h.repo.put_group(&child).await.unwrap();

    let ctx = PermissionContext::new("t1", "u1", "deploy", "run");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
}

#[tokio::test]
async fn parent_role_inheritance() {
    let h = harness();
    h.repo.create_user(&user("u1", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "u1", TenantRole::TenantGuest))
        .await
        .unwrap();
    h.repo
        .put_role(&role("t1", "base", &["logs:read"], &[]))
        .await
        .unwrap();
    h.repo
        .put_role(&role("t1", "derived", &["traces:read"], &["base"]))
        .await
        .unwrap();
    h.repo
        .assign_user_roles("t1", "u1", &["derived".into()])
        .await
        .unwrap();

    // Both the role's own grant and the inherited one hold.
    let ctx = PermissionContext::new("t1", "u1", "traces", "read");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
    let ctx = PermissionContext::new("t1", "u1", "logs", "read");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
}

#[tokio::test]
async fn tenant_admin_builtin_wildcard() {
    let h = harness();
    h.repo.create_user(&user("boss", GlobalRole::None)).await.unwrap();
    h.repo
        .upsert_tenant_user(&membership("t1", "boss", TenantRole::TenantAdmin))
        .await
        .unwrap();

    let ctx = PermissionContext::new("t1", "boss", "kpi_definition", "delete");
    assert!(h.engine.check_permission(&ctx).await.unwrap());
}
