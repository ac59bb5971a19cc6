use std::collections::HashMap;

use crate::graph::RoleGraph;
use crate::permission::{Permission, PermissionGrant, PermissionSet};
use crate::resource::Resource;
use crate::role::Role;

/// An immutable view of every role, membership edge and permission row,
/// taken at one store version. Readers share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    version: u64,
    generation: u64,
    roles: HashMap<String, Role>,
    graph: RoleGraph,
    grants: HashMap<String, HashMap<Resource, PermissionSet>>,
}

impl AuthSnapshot {
    pub fn new(
        version: u64,
        roles: impl IntoIterator<Item = Role>,
        graph: RoleGraph,
        grants: impl IntoIterator<Item = PermissionGrant>,
    ) -> Self {
        let roles = roles
            .into_iter()
            .map(|role| (role.name.clone(), role))
            .collect();

        let mut by_role: HashMap<String, HashMap<Resource, PermissionSet>> = HashMap::new();
        for grant in grants {
            if grant.permissions.is_empty() {
                continue;
            }
            let entry = by_role
                .entry(grant.role)
                .or_default()
                .entry(grant.resource)
                .or_default();
            *entry = entry.union(grant.permissions);
        }

        Self {
            version,
            generation: 0,
            roles,
            graph,
            grants: by_role,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Store version this snapshot was read at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Position in the cache's swap sequence, starting at 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    pub fn effective_roles(&self, role: &str) -> Vec<String> {
        self.graph.effective_roles(role)
    }

    pub fn is_superuser(&self, role: &str) -> bool {
        self.role(role).is_some()
            && self
                .graph
                .effective_roles(role)
                .iter()
                .any(|r| self.role(r).is_some_and(|r| r.is_superuser))
    }

    /// Exact rows held by `role` on `resource`, without any hierarchy walk.
    pub fn permissions_of(&self, role: &str, resource: &Resource) -> PermissionSet {
        self.grants
            .get(role)
            .and_then(|by_resource| by_resource.get(resource))
            .copied()
            .unwrap_or_default()
    }

    /// Whether any role `role` inherits holds `permission` on `resource` or
    /// one of its ancestors. Superuser status is not considered.
    pub fn query(&self, role: &str, resource: &Resource, permission: Permission) -> bool {
        if self.role(role).is_none() {
            return false;
        }
        let effective = self.effective_roles(role);
        resource.ancestors().any(|scope| {
            effective
                .iter()
                .any(|r| self.permissions_of(r, &scope).contains(permission))
        })
    }

    /// Every stored row, sorted by role then resource.
    pub fn grants(&self) -> Vec<PermissionGrant> {
        let mut rows: Vec<PermissionGrant> = self
            .grants
            .iter()
            .flat_map(|(role, by_resource)| {
                by_resource
                    .iter()
                    .map(|(resource, set)| PermissionGrant::new(role.clone(), resource.clone(), *set))
            })
            .collect();
        rows.sort_by(|a, b| (&a.role, &a.resource).cmp(&(&b.role, &b.resource)));
        rows
    }
}
