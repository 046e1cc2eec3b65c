//! Input validation for control-plane mutations.
//!
//! Validation failures carry the offending field name so the API layer can
//! surface `{field, message}` bodies. Invariant violations (system-role
//! edits, global-admin floor) are validation-class errors too.

use lazy_static::lazy_static;
use regex::Regex;

use crate::rbac::{MembershipStatus, TenantRole};
use crate::{CoreError, Result};

/// Maximum length for role names.
pub const MAX_ROLE_NAME_LEN: usize = 100;

/// Maximum length for role and group descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Tenant name length bounds.
pub const MIN_TENANT_NAME_LEN: usize = 3;
pub const MAX_TENANT_NAME_LEN: usize = 50;

/// Maximum length for email addresses (RFC 5321 limit).
pub const MAX_EMAIL_LEN: usize = 254;

lazy_static! {
    static ref TENANT_NAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9 _-]+$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// Validate that a tenant id is present.
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.trim().is_empty() {
        return Err(CoreError::validation("tenant_id", "tenant id is required"));
    }
    Ok(())
}

/// Validate a role name: non-empty, <= 100 characters.
pub fn validate_role_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("name", "role name cannot be empty"));
    }
    if name.len() > MAX_ROLE_NAME_LEN {
        return Err(CoreError::validation(
            "name",
            format!(
                "role name too long: {} > {} characters",
                name.len(),
                MAX_ROLE_NAME_LEN
            ),
        ));
    }
    Ok(())
}

/// Validate a description: <= 500 characters.
pub fn validate_description(description: &str) -> Result<()> {
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(CoreError::validation(
            "description",
            format!(
                "description too long: {} > {} characters",
                description.len(),
                MAX_DESCRIPTION_LEN
            ),
        ));
    }
    Ok(())
}

/// Validate a permission id: `resource:action(:scope)?` with non-empty
/// segments.
pub fn validate_permission_spec(spec: &str) -> Result<()> {
    let parts: Vec<&str> = spec.split(':').collect();
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(CoreError::validation(
            "permissions",
            format!("permission '{spec}' must match resource:action(:scope)?"),
        ));
    }
    Ok(())
}

/// Validate a tenant name: 3-50 characters from `[a-zA-Z0-9 _-]`.
pub fn validate_tenant_name(name: &str) -> Result<()> {
    if name.len() < MIN_TENANT_NAME_LEN || name.len() > MAX_TENANT_NAME_LEN {
        return Err(CoreError::validation(
            "name",
            format!(
                "tenant name must be {MIN_TENANT_NAME_LEN}-{MAX_TENANT_NAME_LEN} characters, got {}",
                name.len()
            ),
        ));
    }
    if !TENANT_NAME_RE.is_match(name) {
        return Err(CoreError::validation(
            "name",
            "tenant name may only contain letters, digits, spaces, '_' and '-'",
        ));
    }
    Ok(())
}

/// Validate an email address: standard shape, <= 254 characters.
pub fn validate_email(email: &str, field: &str) -> Result<()> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(CoreError::validation(
            field.to_string(),
            format!("email too long: {} > {MAX_EMAIL_LEN} characters", email.len()),
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(CoreError::validation(
            field.to_string(),
            format!("'{email}' is not a valid email address"),
        ));
    }
    Ok(())
}

/// Validate a tenant membership role string.
pub fn validate_tenant_role(role: &str) -> Result<TenantRole> {
    match role {
        "tenant_admin" => Ok(TenantRole::TenantAdmin),
        "tenant_editor" => Ok(TenantRole::TenantEditor),
        "tenant_guest" => Ok(TenantRole::TenantGuest),
        other => Err(CoreError::validation(
            "tenantRole",
            format!("'{other}' is not one of tenant_admin, tenant_editor, tenant_guest"),
        )),
    }
}

/// Validate a tenant membership status string.
pub fn validate_membership_status(status: &str) -> Result<MembershipStatus> {
    match status {
        "active" => Ok(MembershipStatus::Active),
        "invited" => Ok(MembershipStatus::Invited),
        "suspended" => Ok(MembershipStatus::Suspended),
        "removed" => Ok(MembershipStatus::Removed),
        other => Err(CoreError::validation(
            "status",
            format!("'{other}' is not one of active, invited, suspended, removed"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_role_names() {
        assert!(validate_role_name("viewer").is_ok());
        assert!(validate_role_name("sre on-call").is_ok());
        assert!(validate_role_name(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn invalid_role_names() {
        assert!(validate_role_name("").is_err());
        assert!(validate_role_name("   ").is_err());
        assert!(validate_role_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn description_length_bound() {
        assert!(validate_description("").is_ok());
        assert!(validate_description(&"d".repeat(500)).is_ok());
        assert!(validate_description(&"d".repeat(501)).is_err());
    }

    #[test]
    fn permission_spec_shapes() {
        assert!(validate_permission_spec("dashboard:read").is_ok());
        assert!(validate_permission_spec("dashboard:read:tenant").is_ok());
        assert!(validate_permission_spec("kpi_definition:*:global").is_ok());
        assert!(validate_permission_spec("dashboard").is_err());
        assert!(validate_permission_spec("dashboard:read:tenant:extra").is_err());
        assert!(validate_permission_spec("dashboard::tenant").is_err());
        assert!(validate_permission_spec(":read").is_err());
    }

    #[test]
    fn tenant_names() {
        assert!(validate_tenant_name("acme").is_ok());
        assert!(validate_tenant_name("Acme Corp_01").is_ok());
        assert!(validate_tenant_name("a-b").is_ok());
        assert!(validate_tenant_name("ab").is_err()); // too short
        assert!(validate_tenant_name(&"a".repeat(51)).is_err()); // too long
        assert!(validate_tenant_name("acme!").is_err()); // bad character
        assert!(validate_tenant_name("acme.corp").is_err()); // dot not allowed
    }

    #[test]
    fn emails() {
        assert!(validate_email("ops@example.com", "adminEmail").is_ok());
        assert!(validate_email("a.b+tag@sub.example.io", "email").is_ok());
        assert!(validate_email("not-an-email", "email").is_err());
        assert!(validate_email("missing@tld", "email").is_err());
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long, "email").is_err());
    }

    #[test]
    fn tenant_role_whitelist() {
        assert_eq!(
            validate_tenant_role("tenant_admin").unwrap(),
            TenantRole::TenantAdmin
        );
        assert!(validate_tenant_role("owner").is_err());
    }

    #[test]
    fn membership_status_whitelist() {
        assert_eq!(
            validate_membership_status("invited").unwrap(),
            MembershipStatus::Invited
        );
        assert!(validate_membership_status("banned").is_err());
    }
}
