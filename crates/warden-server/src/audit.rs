use warden_core::permission::PermissionSet;
use warden_core::resource::Resource;

pub fn audit_permissions_granted(
    actor: &str,
    grantee: &str,
    resource: &Resource,
    permissions: PermissionSet,
) {
    tracing::info!(
        target: "audit",
        event = "permission_grant",
        actor = actor,
        grantee = grantee,
        resource = %resource,
        permissions = %permissions,
        "permissions granted"
    );
}

pub fn audit_permissions_revoked(
    actor: &str,
    revokee: &str,
    resource: &Resource,
    permissions: PermissionSet,
) {
    tracing::info!(
        target: "audit",
        event = "permission_revoke",
        actor = actor,
        revokee = revokee,
        resource = %resource,
        permissions = %permissions,
        "permissions revoked"
    );
}

pub fn audit_role_granted(actor: &str, granted: &str, recipient: &str) {
    tracing::info!(
        target: "audit",
        event = "role_grant",
        actor = actor,
        granted = granted,
        recipient = recipient,
        "role granted"
    );
}

pub fn audit_role_revoked(actor: &str, granted: &str, recipient: &str) {
    tracing::info!(
        target: "audit",
        event = "role_revoke",
        actor = actor,
        granted = granted,
        recipient = recipient,
        "role revoked"
    );
}

pub fn audit_role_created(actor: &str, role: &str, superuser: bool, login: bool) {
    tracing::info!(
        target: "audit",
        event = "role_create",
        actor = actor,
        role = role,
        superuser = superuser,
        login = login,
        "role created"
    );
}

/// Never records the password itself, only whether it changed.
pub fn audit_role_altered(
    actor: &str,
    role: &str,
    superuser: Option<bool>,
    login: Option<bool>,
    password_changed: bool,
) {
    tracing::info!(
        target: "audit",
        event = "role_alter",
        actor = actor,
        role = role,
        superuser = ?superuser,
        login = ?login,
        password_changed = password_changed,
        "role altered"
    );
}

pub fn audit_role_dropped(actor: &str, role: &str) {
    tracing::info!(
        target: "audit",
        event = "role_drop",
        actor = actor,
        role = role,
        "role dropped"
    );
}

pub fn audit_object_created(actor: &str, resource: &Resource, granted: PermissionSet) {
    tracing::info!(
        target: "audit",
        event = "object_create",
        actor = actor,
        resource = %resource,
        granted = %granted,
        "creator permissions granted"
    );
}

pub fn audit_object_dropped(actor: &str, resource: &Resource, removed_pairs: usize) {
    tracing::info!(
        target: "audit",
        event = "object_drop",
        actor = actor,
        resource = %resource,
        removed_pairs = removed_pairs,
        "permissions on dropped object removed"
    );
}

pub fn audit_denied(principal: &str, statement: &str, reason: &str) {
    tracing::warn!(
        target: "audit",
        event = "authz_denied",
        principal = principal,
        statement = statement,
        reason = reason,
        "authorization denied"
    );
}

pub fn audit_login_success(role: &str) {
    tracing::info!(
        target: "audit",
        event = "login_success",
        role = role,
        "login succeeded"
    );
}

pub fn audit_login_failure(role: &str, reason: &str) {
    tracing::warn!(
        target: "audit",
        event = "login_failure",
        role = role,
        reason = reason,
        "login failed"
    );
}
