use std::sync::Arc;

use crate::permission::Permission;
use crate::resource::Resource;
use crate::snapshot::AuthSnapshot;

use super::statement::Statement;
use super::{AuthzError, SnapshotReader};

/// Everything derived from the principal once per decision.
struct CheckContext<'a> {
    snapshot: &'a AuthSnapshot,
    principal: &'a str,
    effective: Vec<String>,
    superuser: bool,
}

impl<'a> CheckContext<'a> {
    fn new(snapshot: &'a AuthSnapshot, principal: &'a str) -> Self {
        // A role missing from the snapshot has been dropped; it inherits nothing.
        let effective = if snapshot.role(principal).is_some() {
            snapshot.effective_roles(principal)
        } else {
            Vec::new()
        };
        let superuser = effective
            .iter()
            .any(|r| snapshot.role(r).is_some_and(|role| role.is_superuser));

        Self {
            snapshot,
            principal,
            effective,
            superuser,
        }
    }

    /// Empty for a principal that no longer exists, so a dropped role is a
    /// member of nothing, itself included.
    fn is_member_of(&self, role: &str) -> bool {
        self.effective.iter().any(|r| r == role)
    }

    fn holds(&self, permission: Permission, resource: &Resource) -> bool {
        if self.superuser {
            return true;
        }
        resource.ancestors().any(|scope| {
            self.effective
                .iter()
                .any(|r| self.snapshot.permissions_of(r, &scope).contains(permission))
        })
    }

    fn require(&self, permission: Permission, resource: &Resource) -> Result<(), AuthzError> {
        if self.holds(permission, resource) {
            Ok(())
        } else {
            Err(unauthorized(self.principal, permission, resource))
        }
    }
}

fn unauthorized(principal: &str, permission: Permission, resource: &Resource) -> AuthzError {
    AuthzError::Unauthorized {
        role: principal.to_string(),
        permission,
        resource: resource.clone(),
    }
}

/// Decides whether a principal may act on a resource. Reads one snapshot per
/// call and performs no I/O.
pub struct Enforcer<R: SnapshotReader> {
    reader: Arc<R>,
}

impl<R: SnapshotReader> Enforcer<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn authorize(
        &self,
        principal: &str,
        permission: Permission,
        resource: &Resource,
    ) -> Result<(), AuthzError> {
        let Some(snapshot) = self.reader.current() else {
            return Err(unauthorized(principal, permission, resource));
        };
        CheckContext::new(&snapshot, principal).require(permission, resource)
    }

    pub fn is_allowed(&self, principal: &str, permission: Permission, resource: &Resource) -> bool {
        self.authorize(principal, permission, resource).is_ok()
    }

    pub fn authorize_statement(
        &self,
        principal: &str,
        statement: &Statement,
    ) -> Result<(), AuthzError> {
        statement.validate()?;

        let Some(snapshot) = self.reader.current() else {
            if let Statement::AlterRole { role, properties } = statement
                && properties.superuser.is_some()
                && role == principal
            {
                return Err(AuthzError::SelfEscalationDenied);
            }
            return match statement.requirements().first() {
                Some(req) => Err(unauthorized(principal, req.permission, &req.resource)),
                None => Err(unauthorized(principal, Permission::Describe, &Resource::Cluster)),
            };
        };

        let ctx = CheckContext::new(&snapshot, principal);
        evaluate(&ctx, statement)
    }
}

fn evaluate(ctx: &CheckContext<'_>, statement: &Statement) -> Result<(), AuthzError> {
    match statement {
        Statement::AlterRole { role, properties } => {
            if properties.superuser.is_some() {
                if ctx.is_member_of(role) {
                    return Err(AuthzError::SelfEscalationDenied);
                }
                if !ctx.superuser {
                    return Err(AuthzError::SuperuserRequired("alter superuser status"));
                }
            }
            if role == ctx.principal && ctx.is_member_of(role) && properties.only_password() {
                return Ok(());
            }
        }
        Statement::ListRoles { of: Some(role) } | Statement::ListPermissions { of: Some(role), .. }
            if ctx.is_member_of(role) =>
        {
            return Ok(());
        }
        _ => {}
    }

    for req in statement.requirements() {
        ctx.require(req.permission, &req.resource)?;
    }

    match statement {
        Statement::CreateRole { properties, .. }
            if properties.superuser == Some(true) && !ctx.superuser =>
        {
            Err(AuthzError::SuperuserRequired(
                "create a role with superuser status",
            ))
        }
        Statement::DropRole { role }
            if !ctx.superuser
                && ctx.snapshot.role(role).is_some_and(|r| r.is_superuser) =>
        {
            Err(AuthzError::SuperuserRequired("drop a role with superuser status"))
        }
        _ => Ok(()),
    }
}
