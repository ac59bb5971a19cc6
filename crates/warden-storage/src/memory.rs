use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use warden_core::graph::RoleGraph;
use warden_core::permission::{PermissionGrant, PermissionSet};
use warden_core::resource::{Resource, ResourceKind};
use warden_core::role::{Role, RoleOptions};
use warden_core::snapshot::AuthSnapshot;
use warden_core::validation::{ValidationError, validate_grant, validate_object};

use crate::traits::{PermissionStore, StorageError};

#[derive(Debug, Default)]
struct InnerState {
    version: u64,
    roles: BTreeMap<String, Role>,
    objects: BTreeSet<Resource>,
    graph: RoleGraph,
    grants: BTreeMap<(String, Resource), PermissionSet>,
}

impl InnerState {
    fn bump(&mut self) {
        self.version += 1;
    }

    fn require_role(&self, name: &str) -> Result<(), StorageError> {
        if self.roles.contains_key(name) {
            Ok(())
        } else {
            Err(StorageError::RoleNotFound(name.to_string()))
        }
    }

    fn require_object(&self, resource: &Resource) -> Result<(), StorageError> {
        if self.objects.contains(resource) {
            Ok(())
        } else {
            Err(StorageError::ObjectNotFound(resource.clone()))
        }
    }

    fn require_grantable(&self, role: &str, resource: &Resource) -> Result<(), StorageError> {
        self.require_role(role)?;
        match resource {
            Resource::Role(target) => self.require_role(target),
            Resource::Keyspace(_) | Resource::Table { .. } => self.require_object(resource),
            Resource::Cluster | Resource::AllKeyspaces | Resource::AllRoles => Ok(()),
        }
    }

    /// Adds a keyspace or table to the catalog. Roles live in `roles` and
    /// must already be there.
    fn register(&mut self, resource: &Resource) -> Result<(), StorageError> {
        if let Resource::Role(name) = resource {
            return self.require_role(name);
        }
        if self.objects.contains(resource) {
            return Err(StorageError::ObjectAlreadyExists(resource.clone()));
        }
        if let Some(keyspace @ Resource::Keyspace(_)) = resource.parent() {
            self.require_object(&keyspace)?;
        }
        self.objects.insert(resource.clone());
        Ok(())
    }

    fn add(&mut self, role: &str, resource: &Resource, permissions: PermissionSet) -> PermissionSet {
        let entry = self
            .grants
            .entry((role.to_string(), resource.clone()))
            .or_default();
        let added = permissions.difference(*entry);
        *entry = entry.union(permissions);
        added
    }

    fn remove_where(&mut self, predicate: impl Fn(&str, &Resource) -> bool) -> usize {
        let before = self.grants.len();
        self.grants
            .retain(|(role, resource), _| !predicate(role.as_str(), resource));
        before - self.grants.len()
    }
}

/// Process-local store. A single mutex serializes every mutation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for InMemoryStore {
    async fn grant_permissions(
        &self,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> Result<PermissionSet, StorageError> {
        validate_grant(resource, permissions)?;

        let mut state = self.state.lock();
        state.require_grantable(role, resource)?;

        let added = state.add(role, resource, permissions);
        if !added.is_empty() {
            state.bump();
        }
        Ok(added)
    }

    async fn revoke_permissions(
        &self,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> Result<PermissionSet, StorageError> {
        validate_grant(resource, permissions)?;

        let mut state = self.state.lock();
        state.require_grantable(role, resource)?;
        let key = (role.to_string(), resource.clone());
        let Some(held) = state.grants.get(&key).copied() else {
            return Ok(PermissionSet::empty());
        };

        let removed: PermissionSet = held.iter().filter(|p| permissions.contains(*p)).collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        let remaining = held.difference(removed);
        if remaining.is_empty() {
            state.grants.remove(&key);
        } else {
            state.grants.insert(key, remaining);
        }
        state.bump();
        Ok(removed)
    }

    async fn permissions_of(
        &self,
        role: &str,
        resource: &Resource,
    ) -> Result<PermissionSet, StorageError> {
        let state = self.state.lock();
        Ok(state
            .grants
            .get(&(role.to_string(), resource.clone()))
            .copied()
            .unwrap_or_default())
    }

    async fn list_permissions(
        &self,
        role: Option<&str>,
    ) -> Result<Vec<PermissionGrant>, StorageError> {
        let state = self.state.lock();
        Ok(state
            .grants
            .iter()
            .filter(|((holder, _), _)| role.is_none_or(|r| r == holder.as_str()))
            .map(|((holder, resource), set)| PermissionGrant::new(holder, resource.clone(), *set))
            .collect())
    }

    async fn on_object_created(
        &self,
        resource: &Resource,
        creator: &str,
    ) -> Result<PermissionSet, StorageError> {
        validate_object(resource)?;

        let mut state = self.state.lock();
        state.require_role(creator)?;
        state.register(resource)?;

        let added = state.add(creator, resource, resource.kind().creator_permissions());
        if !added.is_empty() || !matches!(resource, Resource::Role(_)) {
            state.bump();
        }
        Ok(added)
    }

    async fn on_object_dropped(&self, resource: &Resource) -> Result<usize, StorageError> {
        validate_object(resource)?;

        let mut state = self.state.lock();
        let unregistered = match resource {
            Resource::Role(_) => false,
            _ => {
                state.require_object(resource)?;
                state
                    .objects
                    .retain(|r| r != resource && !r.is_within(resource));
                true
            }
        };

        let removed = state.remove_where(|_, r| r == resource || r.is_within(resource));
        if unregistered || removed > 0 {
            state.bump();
        }
        Ok(removed)
    }

    async fn create_role(&self, role: Role, creator: Option<&str>) -> Result<(), StorageError> {
        let resource = Resource::role(&role.name);
        validate_object(&resource)?;

        let mut state = self.state.lock();
        if state.roles.contains_key(&role.name) {
            return Err(StorageError::RoleAlreadyExists(role.name));
        }
        if let Some(creator) = creator {
            state.require_role(creator)?;
        }

        state.roles.insert(role.name.clone(), role);
        if let Some(creator) = creator {
            state.add(creator, &resource, ResourceKind::Role.creator_permissions());
        }
        state.bump();
        Ok(())
    }

    async fn alter_role(&self, name: &str, options: &RoleOptions) -> Result<Role, StorageError> {
        if options.is_empty() {
            return Err(ValidationError::MissingRoleOptions.into());
        }

        let mut state = self.state.lock();
        let role = state
            .roles
            .get_mut(name)
            .ok_or_else(|| StorageError::RoleNotFound(name.to_string()))?;
        options.apply(role);
        let updated = role.clone();
        state.bump();
        Ok(updated)
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>, StorageError> {
        Ok(self.state.lock().roles.get(name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        Ok(self.state.lock().roles.values().cloned().collect())
    }

    async fn drop_role(&self, name: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.roles.remove(name).is_none() {
            return Err(StorageError::RoleNotFound(name.to_string()));
        }

        let on_role = Resource::role(name);
        state.remove_where(|holder, resource| holder == name || *resource == on_role);
        state.graph.remove_role(name);
        state.bump();
        Ok(())
    }

    async fn grant_role(&self, granted: &str, recipient: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        state.require_role(granted)?;
        state.require_role(recipient)?;

        let added = state.graph.grant_role(granted, recipient)?;
        if added {
            state.bump();
        }
        Ok(added)
    }

    async fn revoke_role(&self, granted: &str, recipient: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        state.require_role(granted)?;
        state.require_role(recipient)?;

        let removed = state.graph.revoke_role(granted, recipient);
        if removed {
            state.bump();
        }
        Ok(removed)
    }

    async fn load_snapshot(&self) -> Result<AuthSnapshot, StorageError> {
        let state = self.state.lock();
        let grants = state
            .grants
            .iter()
            .map(|((role, resource), set)| PermissionGrant::new(role, resource.clone(), *set));

        Ok(AuthSnapshot::new(
            state.version,
            state.roles.values().cloned(),
            state.graph.clone(),
            grants,
        ))
    }

    async fn version(&self) -> Result<u64, StorageError> {
        Ok(self.state.lock().version)
    }
}
