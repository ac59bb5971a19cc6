pub mod migrations;
mod queries;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use warden_core::graph::RoleGraph;
use warden_core::permission::{PermissionGrant, PermissionSet};
use warden_core::resource::{Resource, ResourceKind};
use warden_core::role::{Role, RoleOptions};
use warden_core::snapshot::AuthSnapshot;
use warden_core::validation::{ValidationError, validate_grant, validate_object};

use crate::traits::{PermissionStore, StorageError};

use queries::to_storage_error;

#[allow(clippy::cast_sign_loss)]
fn to_version(value: i64) -> u64 {
    value as u64
}

/// Rebuilds the membership graph from `role_members`. A stored cycle means
/// the table was written around this store and is reported, not skipped.
fn stored_graph(edges: Vec<(String, String)>) -> Result<RoleGraph, StorageError> {
    RoleGraph::from_edges(edges).map_err(|e| {
        tracing::error!(error = %e, "cyclic membership edge in role_members");
        StorageError::Internal(format!("corrupt membership edge: {e}"))
    })
}

/// PostgreSQL-backed store. Each mutation runs in one transaction that
/// starts by locking the `store_version` row and ends by advancing it, so
/// concurrent writers queue up instead of aborting each other.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(to_storage_error)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(to_storage_error)?;
        queries::lock_version(&mut *tx).await?;
        Ok(tx)
    }

    async fn require_object(
        tx: &mut Transaction<'static, Postgres>,
        resource: &Resource,
    ) -> Result<(), StorageError> {
        if queries::object_exists(&mut **tx, resource).await? {
            Ok(())
        } else {
            Err(StorageError::ObjectNotFound(resource.clone()))
        }
    }

    async fn require_role(
        tx: &mut Transaction<'static, Postgres>,
        name: &str,
    ) -> Result<(), StorageError> {
        if queries::role_exists(&mut **tx, name).await? {
            Ok(())
        } else {
            Err(StorageError::RoleNotFound(name.to_string()))
        }
    }

    async fn require_grantable(
        tx: &mut Transaction<'static, Postgres>,
        role: &str,
        resource: &Resource,
    ) -> Result<(), StorageError> {
        Self::require_role(tx, role).await?;
        match resource {
            Resource::Role(target) => Self::require_role(tx, target).await,
            Resource::Keyspace(_) | Resource::Table { .. } => {
                Self::require_object(tx, resource).await
            }
            Resource::Cluster | Resource::AllKeyspaces | Resource::AllRoles => Ok(()),
        }
    }

    /// Adds a keyspace or table to the catalog. Roles are registered by
    /// `create_role` and only need to exist.
    async fn register(
        tx: &mut Transaction<'static, Postgres>,
        resource: &Resource,
    ) -> Result<(), StorageError> {
        if let Resource::Role(name) = resource {
            return Self::require_role(tx, name).await;
        }
        if queries::object_exists(&mut **tx, resource).await? {
            return Err(StorageError::ObjectAlreadyExists(resource.clone()));
        }
        if let Some(keyspace @ Resource::Keyspace(_)) = resource.parent() {
            Self::require_object(tx, &keyspace).await?;
        }
        queries::insert_object(&mut **tx, resource).await
    }

    async fn insert_all(
        tx: &mut Transaction<'static, Postgres>,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> Result<PermissionSet, StorageError> {
        let mut added = PermissionSet::empty();
        for permission in permissions.iter() {
            if queries::insert_permission(&mut **tx, role, resource, permission).await? {
                added.insert(permission);
            }
        }
        Ok(added)
    }

    async fn finish(
        mut tx: Transaction<'static, Postgres>,
        changed: bool,
    ) -> Result<(), StorageError> {
        if changed {
            queries::bump_version(&mut *tx).await?;
        }
        tx.commit().await.map_err(to_storage_error)
    }
}

impl PermissionStore for PostgresStore {
    async fn grant_permissions(
        &self,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> Result<PermissionSet, StorageError> {
        validate_grant(resource, permissions)?;

        let mut tx = self.begin().await?;
        Self::require_grantable(&mut tx, role, resource).await?;
        let added = Self::insert_all(&mut tx, role, resource, permissions).await?;
        Self::finish(tx, !added.is_empty()).await?;
        Ok(added)
    }

    async fn revoke_permissions(
        &self,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> Result<PermissionSet, StorageError> {
        validate_grant(resource, permissions)?;

        let mut tx = self.begin().await?;
        Self::require_grantable(&mut tx, role, resource).await?;
        let mut removed = PermissionSet::empty();
        for permission in permissions.iter() {
            if queries::delete_permission(&mut *tx, role, resource, permission).await? {
                removed.insert(permission);
            }
        }
        Self::finish(tx, !removed.is_empty()).await?;
        Ok(removed)
    }

    async fn permissions_of(
        &self,
        role: &str,
        resource: &Resource,
    ) -> Result<PermissionSet, StorageError> {
        queries::fetch_permission_set(&self.pool, role, resource).await
    }

    async fn list_permissions(
        &self,
        role: Option<&str>,
    ) -> Result<Vec<PermissionGrant>, StorageError> {
        queries::fetch_grants(&self.pool, role).await
    }

    async fn on_object_created(
        &self,
        resource: &Resource,
        creator: &str,
    ) -> Result<PermissionSet, StorageError> {
        validate_object(resource)?;

        let mut tx = self.begin().await?;
        Self::require_role(&mut tx, creator).await?;
        Self::register(&mut tx, resource).await?;
        let added = Self::insert_all(
            &mut tx,
            creator,
            resource,
            resource.kind().creator_permissions(),
        )
        .await?;
        let registered = !matches!(resource, Resource::Role(_));
        Self::finish(tx, registered || !added.is_empty()).await?;
        Ok(added)
    }

    async fn on_object_dropped(&self, resource: &Resource) -> Result<usize, StorageError> {
        validate_object(resource)?;

        let mut tx = self.begin().await?;
        let unregistered = match resource {
            Resource::Role(_) => false,
            _ => {
                Self::require_object(&mut tx, resource).await?;
                queries::delete_objects_on(&mut *tx, resource).await? > 0
            }
        };
        let pairs = queries::count_pairs_on(&mut *tx, resource).await?;
        let rows = queries::delete_permissions_on(&mut *tx, resource).await?;
        Self::finish(tx, unregistered || rows > 0).await?;
        Ok(usize::try_from(pairs).unwrap_or_default())
    }

    async fn create_role(&self, role: Role, creator: Option<&str>) -> Result<(), StorageError> {
        validate_object(&Resource::role(&role.name))?;

        let mut tx = self.begin().await?;
        if let Some(creator) = creator {
            Self::require_role(&mut tx, creator).await?;
        }
        queries::insert_role(&mut *tx, &role).await?;
        if let Some(creator) = creator {
            Self::insert_all(
                &mut tx,
                creator,
                &Resource::role(&role.name),
                ResourceKind::Role.creator_permissions(),
            )
            .await?;
        }
        Self::finish(tx, true).await
    }

    async fn alter_role(&self, name: &str, options: &RoleOptions) -> Result<Role, StorageError> {
        if options.is_empty() {
            return Err(ValidationError::MissingRoleOptions.into());
        }

        let mut tx = self.begin().await?;
        let mut role = queries::fetch_role(&mut *tx, name)
            .await?
            .ok_or_else(|| StorageError::RoleNotFound(name.to_string()))?;
        options.apply(&mut role);
        queries::update_role(&mut *tx, &role).await?;
        Self::finish(tx, true).await?;
        Ok(role)
    }

    async fn get_role(&self, name: &str) -> Result<Option<Role>, StorageError> {
        queries::fetch_role(&self.pool, name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        queries::fetch_roles(&self.pool).await
    }

    async fn drop_role(&self, name: &str) -> Result<(), StorageError> {
        let mut tx = self.begin().await?;
        Self::require_role(&mut tx, name).await?;

        queries::delete_permissions_on(&mut *tx, &Resource::role(name)).await?;
        queries::delete_permissions_held_by(&mut *tx, name).await?;
        queries::delete_edges_touching(&mut *tx, name).await?;
        queries::delete_role(&mut *tx, name).await?;
        Self::finish(tx, true).await
    }

    async fn grant_role(&self, granted: &str, recipient: &str) -> Result<bool, StorageError> {
        let mut tx = self.begin().await?;
        Self::require_role(&mut tx, granted).await?;
        Self::require_role(&mut tx, recipient).await?;

        let mut graph = stored_graph(queries::fetch_edges(&mut *tx).await?)?;
        if !graph.grant_role(granted, recipient)? {
            return Ok(false);
        }

        let added = queries::insert_edge(&mut *tx, granted, recipient).await?;
        Self::finish(tx, added).await?;
        Ok(added)
    }

    async fn revoke_role(&self, granted: &str, recipient: &str) -> Result<bool, StorageError> {
        let mut tx = self.begin().await?;
        Self::require_role(&mut tx, granted).await?;
        Self::require_role(&mut tx, recipient).await?;

        let removed = queries::delete_edge(&mut *tx, granted, recipient).await?;
        Self::finish(tx, removed).await?;
        Ok(removed)
    }

    async fn load_snapshot(&self) -> Result<AuthSnapshot, StorageError> {
        let mut tx = self.pool.begin().await.map_err(to_storage_error)?;
        queries::set_read_only_snapshot(&mut *tx).await?;

        let version = queries::current_version(&mut *tx).await?;
        let roles = queries::fetch_roles(&mut *tx).await?;
        let graph = stored_graph(queries::fetch_edges(&mut *tx).await?)?;
        let grants = queries::fetch_grants(&mut *tx, None).await?;
        tx.commit().await.map_err(to_storage_error)?;

        Ok(AuthSnapshot::new(to_version(version), roles, graph, grants))
    }

    async fn version(&self) -> Result<u64, StorageError> {
        queries::current_version(&self.pool).await.map(to_version)
    }
}
