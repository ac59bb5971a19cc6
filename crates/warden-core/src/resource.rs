use std::fmt;
use std::str::FromStr;

use crate::permission::{Permission, PermissionSet};
use crate::validation::ValidationError;

const CLUSTER_ROOT: &str = "cluster";
const DATA_ROOT: &str = "data";
const ROLES_ROOT: &str = "roles";
const SEPARATOR: char = '/';

/// A securable object. `Cluster` is the single root; `AllKeyspaces` and
/// `AllRoles` are the wildcard scopes directly beneath it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Cluster,
    AllKeyspaces,
    Keyspace(String),
    Table { keyspace: String, table: String },
    AllRoles,
    Role(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cluster,
    AllKeyspaces,
    Keyspace,
    Table,
    AllRoles,
    Role,
}

const DATA_PERMISSIONS: PermissionSet = PermissionSet::of(&[
    Permission::Alter,
    Permission::Authorize,
    Permission::Create,
    Permission::Drop,
    Permission::Modify,
    Permission::Select,
]);

// Auto-granted to table creators. CREATE stays grantable on tables.
const TABLE_CREATOR_PERMISSIONS: PermissionSet = PermissionSet::of(&[
    Permission::Alter,
    Permission::Authorize,
    Permission::Drop,
    Permission::Modify,
    Permission::Select,
]);

const ALL_ROLES_PERMISSIONS: PermissionSet = PermissionSet::of(&[
    Permission::Alter,
    Permission::Authorize,
    Permission::Create,
    Permission::Describe,
    Permission::Drop,
]);

const ROLE_PERMISSIONS: PermissionSet = PermissionSet::of(&[
    Permission::Alter,
    Permission::Authorize,
    Permission::Drop,
]);

// Indexed by `ResourceKind as usize`.
const SUPPORTED_PERMISSIONS: [PermissionSet; 6] = [
    PermissionSet::all(),
    DATA_PERMISSIONS,
    DATA_PERMISSIONS,
    DATA_PERMISSIONS,
    ALL_ROLES_PERMISSIONS,
    ROLE_PERMISSIONS,
];

impl ResourceKind {
    pub fn supported_permissions(self) -> PermissionSet {
        SUPPORTED_PERMISSIONS[self as usize]
    }

    /// What the creator of a new object of this kind is granted on it.
    /// Wildcard scopes cannot be created and yield an empty set.
    pub fn creator_permissions(self) -> PermissionSet {
        match self {
            ResourceKind::Keyspace => DATA_PERMISSIONS,
            ResourceKind::Table => TABLE_CREATOR_PERMISSIONS,
            ResourceKind::Role => ROLE_PERMISSIONS,
            ResourceKind::Cluster | ResourceKind::AllKeyspaces | ResourceKind::AllRoles => {
                PermissionSet::empty()
            }
        }
    }

    /// Resource family named in unsupported-permission errors.
    pub fn family(self) -> &'static str {
        match self {
            ResourceKind::Cluster => "ClusterResource",
            ResourceKind::AllKeyspaces | ResourceKind::Keyspace | ResourceKind::Table => {
                "DataResource"
            }
            ResourceKind::AllRoles | ResourceKind::Role => "RoleResource",
        }
    }

    pub fn is_object(self) -> bool {
        matches!(
            self,
            ResourceKind::Keyspace | ResourceKind::Table | ResourceKind::Role
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::AllKeyspaces => "all keyspaces",
            ResourceKind::Keyspace => "keyspace",
            ResourceKind::Table => "table",
            ResourceKind::AllRoles => "all roles",
            ResourceKind::Role => "role",
        };
        f.write_str(name)
    }
}

impl Resource {
    pub fn keyspace(name: impl Into<String>) -> Self {
        Resource::Keyspace(name.into())
    }

    pub fn table(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Resource::Table {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Resource::Role(name.into())
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Cluster => ResourceKind::Cluster,
            Resource::AllKeyspaces => ResourceKind::AllKeyspaces,
            Resource::Keyspace(_) => ResourceKind::Keyspace,
            Resource::Table { .. } => ResourceKind::Table,
            Resource::AllRoles => ResourceKind::AllRoles,
            Resource::Role(_) => ResourceKind::Role,
        }
    }

    pub fn parent(&self) -> Option<Resource> {
        match self {
            Resource::Cluster => None,
            Resource::AllKeyspaces | Resource::AllRoles => Some(Resource::Cluster),
            Resource::Keyspace(_) => Some(Resource::AllKeyspaces),
            Resource::Table { keyspace, .. } => Some(Resource::Keyspace(keyspace.clone())),
            Resource::Role(_) => Some(Resource::AllRoles),
        }
    }

    /// The resource itself followed by each parent up to `Cluster`.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// True when `other` is a strict ancestor of `self`.
    pub fn is_within(&self, other: &Resource) -> bool {
        self.ancestors().skip(1).any(|r| &r == other)
    }

    pub fn supported_permissions(&self) -> PermissionSet {
        self.kind().supported_permissions()
    }

    pub fn canonical(&self) -> String {
        match self {
            Resource::Cluster => CLUSTER_ROOT.to_string(),
            Resource::AllKeyspaces => DATA_ROOT.to_string(),
            Resource::Keyspace(ks) => format!("{DATA_ROOT}/{ks}"),
            Resource::Table { keyspace, table } => format!("{DATA_ROOT}/{keyspace}/{table}"),
            Resource::AllRoles => ROLES_ROOT.to_string(),
            Resource::Role(role) => format!("{ROLES_ROOT}/{role}"),
        }
    }

    /// Human-readable form used in denial messages, e.g. `<table ks.t>`.
    pub fn label(&self) -> String {
        match self {
            Resource::Cluster => "<cluster>".to_string(),
            Resource::AllKeyspaces => "<all keyspaces>".to_string(),
            Resource::Keyspace(ks) => format!("<keyspace {ks}>"),
            Resource::Table { keyspace, table } => format!("<table {keyspace}.{table}>"),
            Resource::AllRoles => "<all roles>".to_string(),
            Resource::Role(role) => format!("<role {role}>"),
        }
    }

    pub fn parse(canonical: &str) -> Result<Resource, ValidationError> {
        canonical.parse()
    }

    /// Names must be non-empty and free of the `/` separator, so that the
    /// canonical string maps back to exactly this resource.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let names: Vec<&str> = match self {
            Resource::Cluster | Resource::AllKeyspaces | Resource::AllRoles => Vec::new(),
            Resource::Keyspace(ks) => vec![ks.as_str()],
            Resource::Table { keyspace, table } => vec![keyspace.as_str(), table.as_str()],
            Resource::Role(role) => vec![role.as_str()],
        };

        if names
            .iter()
            .any(|name| name.is_empty() || name.contains(SEPARATOR))
        {
            return Err(ValidationError::MalformedResource(self.canonical()));
        }
        Ok(())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Resource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split(SEPARATOR);
        let root = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        if rest.iter().any(|segment| segment.is_empty()) {
            return Err(ValidationError::MalformedResource(s.to_string()));
        }

        match (root, rest.as_slice()) {
            (CLUSTER_ROOT, []) => Ok(Resource::Cluster),
            (DATA_ROOT, []) => Ok(Resource::AllKeyspaces),
            (DATA_ROOT, [ks]) => Ok(Resource::keyspace(*ks)),
            (DATA_ROOT, [ks, table]) => Ok(Resource::table(*ks, *table)),
            (ROLES_ROOT, []) => Ok(Resource::AllRoles),
            (ROLES_ROOT, [role]) => Ok(Resource::role(*role)),
            _ => Err(ValidationError::MalformedResource(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ancestors {
    next: Option<Resource>,
}

impl Iterator for Ancestors {
    type Item = Resource;

    fn next(&mut self) -> Option<Resource> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}
