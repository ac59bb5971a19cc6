use warden_core::permission::{Permission, PermissionGrant, PermissionSet};
use warden_core::resource::Resource;
use warden_core::role::{Role, RoleOptions};
use warden_core::snapshot::AuthSnapshot;
use warden_core::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} doesn't exist")]
    RoleNotFound(String),
    #[error("{0} already exists")]
    RoleAlreadyExists(String),
    #[error("Resource {} doesn't exist", .0.label())]
    ObjectNotFound(Resource),
    #[error("{} already exists", .0.label())]
    ObjectAlreadyExists(Resource),
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Durable `(role, resource) -> permissions` mapping together with the role
/// catalog, the keyspace and table catalog and membership edges. Every
/// mutating call is atomic and advances `version` when it changes anything.
///
/// Rows only ever reference existing objects: granting or revoking on an
/// unknown keyspace, table or role fails with a not-found error.
pub trait PermissionStore: Send + Sync {
    /// Adds `permissions` for `role` on `resource` and returns the subset that
    /// was not already held.
    fn grant_permissions(
        &self,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> impl Future<Output = Result<PermissionSet, StorageError>> + Send;

    /// Removes `permissions` and returns the subset that was actually held.
    fn revoke_permissions(
        &self,
        role: &str,
        resource: &Resource,
        permissions: PermissionSet,
    ) -> impl Future<Output = Result<PermissionSet, StorageError>> + Send;

    fn grant(
        &self,
        role: &str,
        resource: &Resource,
        permission: Permission,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send {
        async move {
            let added = self
                .grant_permissions(role, resource, permission.into())
                .await?;
            Ok(!added.is_empty())
        }
    }

    fn revoke(
        &self,
        role: &str,
        resource: &Resource,
        permission: Permission,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send {
        async move {
            let removed = self
                .revoke_permissions(role, resource, permission.into())
                .await?;
            Ok(!removed.is_empty())
        }
    }

    fn grant_all(
        &self,
        role: &str,
        resource: &Resource,
    ) -> impl Future<Output = Result<PermissionSet, StorageError>> + Send {
        self.grant_permissions(role, resource, resource.supported_permissions())
    }

    fn revoke_all(
        &self,
        role: &str,
        resource: &Resource,
    ) -> impl Future<Output = Result<PermissionSet, StorageError>> + Send {
        self.revoke_permissions(role, resource, resource.supported_permissions())
    }

    /// Rows stored for exactly this pair. Ancestors are not consulted.
    fn permissions_of(
        &self,
        role: &str,
        resource: &Resource,
    ) -> impl Future<Output = Result<PermissionSet, StorageError>> + Send;

    fn list_permissions(
        &self,
        role: Option<&str>,
    ) -> impl Future<Output = Result<Vec<PermissionGrant>, StorageError>> + Send;

    /// Registers a new keyspace or table and grants `creator` the creator set
    /// on it. Fails with `ObjectAlreadyExists` when the object exists and with
    /// `ObjectNotFound` when a table's keyspace does not. For roles, which are
    /// registered by `create_role`, only the grant is applied.
    fn on_object_created(
        &self,
        resource: &Resource,
        creator: &str,
    ) -> impl Future<Output = Result<PermissionSet, StorageError>> + Send;

    /// Unregisters a keyspace or table, along with the tables of a keyspace,
    /// and deletes every row on `resource` and on anything nested beneath it.
    /// Returns the number of `(role, resource)` pairs removed.
    fn on_object_dropped(
        &self,
        resource: &Resource,
    ) -> impl Future<Output = Result<usize, StorageError>> + Send;

    /// Inserts `role` and, when `creator` is given, the creator grant on
    /// `roles/<name>` in the same transaction.
    fn create_role(
        &self,
        role: Role,
        creator: Option<&str>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn alter_role(
        &self,
        name: &str,
        options: &RoleOptions,
    ) -> impl Future<Output = Result<Role, StorageError>> + Send;

    fn get_role(&self, name: &str)
    -> impl Future<Output = Result<Option<Role>, StorageError>> + Send;

    fn list_roles(&self) -> impl Future<Output = Result<Vec<Role>, StorageError>> + Send;

    /// Removes the role along with rows on it, rows it holds and every
    /// membership edge touching it.
    fn drop_role(&self, name: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn grant_role(
        &self,
        granted: &str,
        recipient: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn revoke_role(
        &self,
        granted: &str,
        recipient: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// One consistent read of roles, edges and rows, tagged with the version
    /// it was taken at.
    fn load_snapshot(&self) -> impl Future<Output = Result<AuthSnapshot, StorageError>> + Send;

    fn version(&self) -> impl Future<Output = Result<u64, StorageError>> + Send;
}
