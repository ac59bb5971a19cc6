use std::fmt;
use std::str::FromStr;

use crate::resource::Resource;
use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    Alter,
    Authorize,
    Create,
    Describe,
    Drop,
    Modify,
    Select,
}

impl Permission {
    pub const ALL: [Permission; 7] = [
        Permission::Alter,
        Permission::Authorize,
        Permission::Create,
        Permission::Describe,
        Permission::Drop,
        Permission::Modify,
        Permission::Select,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Alter => "ALTER",
            Permission::Authorize => "AUTHORIZE",
            Permission::Create => "CREATE",
            Permission::Describe => "DESCRIBE",
            Permission::Drop => "DROP",
            Permission::Modify => "MODIFY",
            Permission::Select => "SELECT",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownPermission(s.to_string()))
    }
}

/// A set of permissions packed into a bitmask. Iteration order is alphabetical,
/// which is also the order listings are rendered in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PermissionSet(u8);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn of(permissions: &[Permission]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < permissions.len() {
            bits |= permissions[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn all() -> Self {
        Self::of(&Permission::ALL)
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        let added = !self.contains(permission);
        self.0 |= permission.bit();
        added
    }

    pub fn remove(&mut self, permission: Permission) -> bool {
        let present = self.contains(permission);
        self.0 &= !permission.bit();
        present
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl From<Permission> for PermissionSet {
    fn from(permission: Permission) -> Self {
        Self(permission.bit())
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Self::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|p| p.as_str()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// One catalog-visible row: everything `role` holds directly on `resource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub role: String,
    pub resource: Resource,
    pub permissions: PermissionSet,
}

impl PermissionGrant {
    pub fn new(role: impl Into<String>, resource: Resource, permissions: PermissionSet) -> Self {
        Self {
            role: role.into(),
            resource,
            permissions,
        }
    }
}
