use crate::permission::{Permission, PermissionSet};
use crate::resource::Resource;
use crate::validation::{ValidationError, validate_grant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub keyspace: String,
    pub table: String,
}

impl TableRef {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }

    pub fn resource(&self) -> Resource {
        Resource::table(&self.keyspace, &self.table)
    }

    pub fn keyspace_resource(&self) -> Resource {
        Resource::keyspace(&self.keyspace)
    }
}

/// `WITH ...` clause of CREATE/ALTER ROLE. The password is plaintext here;
/// it is hashed before it reaches the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleProperties {
    pub login: Option<bool>,
    pub superuser: Option<bool>,
    pub password: Option<String>,
}

impl RoleProperties {
    pub fn is_empty(&self) -> bool {
        self.login.is_none() && self.superuser.is_none() && self.password.is_none()
    }

    pub fn only_password(&self) -> bool {
        self.password.is_some() && self.login.is_none() && self.superuser.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSpec {
    All,
    Only(PermissionSet),
}

impl PermissionSpec {
    /// `ALL` expands to whatever the resource supports.
    pub fn resolve(&self, resource: &Resource) -> Result<PermissionSet, ValidationError> {
        match self {
            PermissionSpec::All => Ok(resource.supported_permissions()),
            PermissionSpec::Only(set) => {
                validate_grant(resource, *set)?;
                Ok(*set)
            }
        }
    }
}

impl From<Permission> for PermissionSpec {
    fn from(permission: Permission) -> Self {
        PermissionSpec::Only(permission.into())
    }
}

/// A parsed data or administrative statement, as handed over by the query layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateKeyspace { keyspace: String },
    DropKeyspace { keyspace: String },
    CreateTable(TableRef),
    AlterTable(TableRef),
    DropTable(TableRef),
    CreateIndex { table: TableRef, index: String },
    DropIndex { table: TableRef, index: String },
    CreateType { keyspace: String, name: String },
    DropType { keyspace: String, name: String },
    Select(TableRef),
    Insert(TableRef),
    Update(TableRef),
    Delete(TableRef),
    Truncate(TableRef),
    CreateRole { role: String, properties: RoleProperties },
    AlterRole { role: String, properties: RoleProperties },
    DropRole { role: String },
    GrantRole { granted: String, recipient: String },
    RevokeRole { granted: String, recipient: String },
    GrantPermission {
        permissions: PermissionSpec,
        resource: Resource,
        grantee: String,
    },
    RevokePermission {
        permissions: PermissionSpec,
        resource: Resource,
        revokee: String,
    },
    ListRoles { of: Option<String> },
    ListPermissions {
        of: Option<String>,
        resource: Option<Resource>,
    },
}

/// One permission the principal must hold, directly or through an ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub permission: Permission,
    pub resource: Resource,
}

impl Requirement {
    fn new(permission: Permission, resource: Resource) -> Self {
        Self {
            permission,
            resource,
        }
    }
}

impl Statement {
    pub fn name(&self) -> &'static str {
        match self {
            Statement::CreateKeyspace { .. } => "CREATE KEYSPACE",
            Statement::DropKeyspace { .. } => "DROP KEYSPACE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::AlterTable(_) => "ALTER TABLE",
            Statement::DropTable(_) => "DROP TABLE",
            Statement::CreateIndex { .. } => "CREATE INDEX",
            Statement::DropIndex { .. } => "DROP INDEX",
            Statement::CreateType { .. } => "CREATE TYPE",
            Statement::DropType { .. } => "DROP TYPE",
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Truncate(_) => "TRUNCATE",
            Statement::CreateRole { .. } => "CREATE ROLE",
            Statement::AlterRole { .. } => "ALTER ROLE",
            Statement::DropRole { .. } => "DROP ROLE",
            Statement::GrantRole { .. } => "GRANT ROLE",
            Statement::RevokeRole { .. } => "REVOKE ROLE",
            Statement::GrantPermission { .. } => "GRANT",
            Statement::RevokePermission { .. } => "REVOKE",
            Statement::ListRoles { .. } => "LIST ROLES",
            Statement::ListPermissions { .. } => "LIST PERMISSIONS",
        }
    }

    /// Shape checks that do not depend on who is asking.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for resource in self.named_resources() {
            resource.validate()?;
        }

        match self {
            Statement::AlterRole { properties, .. } if properties.is_empty() => {
                Err(ValidationError::MissingRoleOptions)
            }
            Statement::GrantPermission {
                permissions,
                resource,
                ..
            }
            | Statement::RevokePermission {
                permissions,
                resource,
                ..
            } => permissions.resolve(resource).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Every keyspace, table and role the statement refers to by name.
    fn named_resources(&self) -> Vec<Resource> {
        match self {
            Statement::CreateKeyspace { keyspace }
            | Statement::DropKeyspace { keyspace }
            | Statement::CreateType { keyspace, .. }
            | Statement::DropType { keyspace, .. } => vec![Resource::keyspace(keyspace)],
            Statement::CreateTable(table)
            | Statement::AlterTable(table)
            | Statement::DropTable(table)
            | Statement::CreateIndex { table, .. }
            | Statement::DropIndex { table, .. }
            | Statement::Select(table)
            | Statement::Insert(table)
            | Statement::Update(table)
            | Statement::Delete(table)
            | Statement::Truncate(table) => vec![table.resource()],
            Statement::CreateRole { role, .. }
            | Statement::AlterRole { role, .. }
            | Statement::DropRole { role } => vec![Resource::role(role)],
            Statement::GrantRole { granted, recipient }
            | Statement::RevokeRole { granted, recipient } => {
                vec![Resource::role(granted), Resource::role(recipient)]
            }
            Statement::GrantPermission {
                resource, grantee, ..
            }
            | Statement::RevokePermission {
                resource,
                revokee: grantee,
                ..
            } => vec![resource.clone(), Resource::role(grantee)],
            Statement::ListRoles { of } => of.iter().map(Resource::role).collect(),
            Statement::ListPermissions { of, resource } => of
                .iter()
                .map(Resource::role)
                .chain(resource.iter().cloned())
                .collect(),
        }
    }

    /// Permissions checked against the hierarchy. Role-specific rules such as
    /// superuser requirements live in the enforcer.
    pub fn requirements(&self) -> Vec<Requirement> {
        let single = |permission, resource| vec![Requirement::new(permission, resource)];

        match self {
            Statement::CreateKeyspace { .. } => single(Permission::Create, Resource::AllKeyspaces),
            Statement::DropKeyspace { keyspace } => {
                single(Permission::Drop, Resource::keyspace(keyspace))
            }
            Statement::CreateTable(table) => single(Permission::Create, table.keyspace_resource()),
            Statement::CreateType { keyspace, .. } => {
                single(Permission::Create, Resource::keyspace(keyspace))
            }
            Statement::DropType { keyspace, .. } => {
                single(Permission::Drop, Resource::keyspace(keyspace))
            }
            Statement::AlterTable(table)
            | Statement::CreateIndex { table, .. }
            | Statement::DropIndex { table, .. } => single(Permission::Alter, table.resource()),
            Statement::DropTable(table) => single(Permission::Drop, table.resource()),
            Statement::Select(table) => single(Permission::Select, table.resource()),
            Statement::Insert(table)
            | Statement::Update(table)
            | Statement::Delete(table)
            | Statement::Truncate(table) => single(Permission::Modify, table.resource()),
            Statement::CreateRole { .. } => single(Permission::Create, Resource::AllRoles),
            Statement::AlterRole { role, .. } => single(Permission::Alter, Resource::role(role)),
            Statement::DropRole { role } => single(Permission::Drop, Resource::role(role)),
            Statement::GrantRole { granted, recipient }
            | Statement::RevokeRole { granted, recipient } => vec![
                Requirement::new(Permission::Authorize, Resource::role(granted)),
                Requirement::new(Permission::Authorize, Resource::role(recipient)),
            ],
            Statement::GrantPermission { resource, .. }
            | Statement::RevokePermission { resource, .. } => {
                single(Permission::Authorize, resource.clone())
            }
            Statement::ListRoles { .. } | Statement::ListPermissions { .. } => {
                single(Permission::Describe, Resource::AllRoles)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(statement: Statement) -> (Permission, String) {
        let reqs = statement.requirements();
        assert_eq!(reqs.len(), 1, "{statement:?}");
        (reqs[0].permission, reqs[0].resource.canonical())
    }

    #[test]
    fn ddl_requirements() {
        let t = TableRef::new("ks", "t");

        assert_eq!(
            single(Statement::CreateKeyspace {
                keyspace: "ks".into()
            }),
            (Permission::Create, "data".into())
        );
        assert_eq!(
            single(Statement::DropKeyspace {
                keyspace: "ks".into()
            }),
            (Permission::Drop, "data/ks".into())
        );
        assert_eq!(
            single(Statement::CreateTable(t.clone())),
            (Permission::Create, "data/ks".into())
        );
        assert_eq!(
            single(Statement::CreateIndex {
                table: t.clone(),
                index: "idx".into()
            }),
            (Permission::Alter, "data/ks/t".into())
        );
        assert_eq!(
            single(Statement::DropType {
                keyspace: "ks".into(),
                name: "addr".into()
            }),
            (Permission::Drop, "data/ks".into())
        );
        assert_eq!(
            single(Statement::DropTable(t)),
            (Permission::Drop, "data/ks/t".into())
        );
    }

    #[test]
    fn dml_requirements() {
        let t = TableRef::new("ks", "t");

        assert_eq!(
            single(Statement::Select(t.clone())),
            (Permission::Select, "data/ks/t".into())
        );
        for statement in [
            Statement::Insert(t.clone()),
            Statement::Update(t.clone()),
            Statement::Delete(t.clone()),
            Statement::Truncate(t),
        ] {
            assert_eq!(single(statement), (Permission::Modify, "data/ks/t".into()));
        }
    }

    #[test]
    fn grant_role_needs_authorize_on_both_roles() {
        let reqs = Statement::GrantRole {
            granted: "a".into(),
            recipient: "b".into(),
        }
        .requirements();

        assert_eq!(
            reqs,
            vec![
                Requirement::new(Permission::Authorize, Resource::role("a")),
                Requirement::new(Permission::Authorize, Resource::role("b")),
            ]
        );
    }

    #[test]
    fn alter_role_without_properties_is_rejected() {
        let statement = Statement::AlterRole {
            role: "r".into(),
            properties: RoleProperties::default(),
        };

        let err = statement.validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingRoleOptions);
        assert!(err.to_string().contains("expecting WITH"));
    }

    #[test]
    fn grant_of_unsupported_permission_is_rejected() {
        let statement = Statement::GrantPermission {
            permissions: Permission::Describe.into(),
            resource: Resource::table("ks", "t"),
            grantee: "u".into(),
        };

        assert!(matches!(
            statement.validate(),
            Err(ValidationError::UnsupportedPermission { .. })
        ));
    }

    #[test]
    fn grant_all_on_table_includes_create() {
        let set = PermissionSpec::All.resolve(&Resource::table("ks", "t")).unwrap();

        assert_eq!(set.len(), 6);
        assert!(set.contains(Permission::Create));
    }

    #[test]
    fn malformed_names_are_rejected() {
        for statement in [
            Statement::CreateKeyspace {
                keyspace: "a/b".into(),
            },
            Statement::CreateKeyspace {
                keyspace: String::new(),
            },
            Statement::Select(TableRef::new("ks", "")),
            Statement::DropRole { role: "x/y".into() },
            Statement::GrantPermission {
                permissions: Permission::Select.into(),
                resource: Resource::keyspace("ks"),
                grantee: String::new(),
            },
            Statement::ListPermissions {
                of: None,
                resource: Some(Resource::keyspace("a/b")),
            },
        ] {
            assert!(
                matches!(
                    statement.validate(),
                    Err(ValidationError::MalformedResource(_))
                ),
                "{statement:?}"
            );
        }
    }

    #[test]
    fn all_resolves_to_supported_set() {
        let set = PermissionSpec::All.resolve(&Resource::role("r")).unwrap();

        assert_eq!(set.to_string(), "{ALTER, AUTHORIZE, DROP}");
    }

    #[test]
    fn only_password_detection() {
        let props = RoleProperties {
            password: Some("pw".into()),
            ..Default::default()
        };
        assert!(props.only_password());

        let props = RoleProperties {
            password: Some("pw".into()),
            login: Some(true),
            ..Default::default()
        };
        assert!(!props.only_password());
    }
}
