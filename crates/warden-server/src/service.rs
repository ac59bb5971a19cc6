use std::sync::Arc;

use warden_core::engine::{AuthzError, Enforcer, RoleProperties, SnapshotReader, Statement};
use warden_core::permission::{Permission, PermissionGrant};
use warden_core::resource::Resource;
use warden_core::role::{Role, RoleOptions};
use warden_storage::{PermissionStore, StorageError};

use crate::audit;
use crate::cache::PermissionCache;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::password::{hash_password, verify_password};

/// What an authorized statement produced. Data statements only need the
/// go-ahead; listings carry their rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Roles(Vec<Role>),
    Permissions(Vec<PermissionGrant>),
}

/// A statement accepted by `prepare`. Holding one grants nothing: every
/// execution is authorized again against the cache of that moment.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    statement: Arc<Statement>,
}

impl PreparedStatement {
    pub fn statement(&self) -> &Statement {
        &self.statement
    }
}

pub struct AuthService<S: PermissionStore + 'static> {
    store: Arc<S>,
    cache: Arc<PermissionCache<S>>,
    enforcer: Enforcer<PermissionCache<S>>,
    metrics: Arc<Metrics>,
}

impl<S: PermissionStore + 'static> AuthService<S> {
    pub fn new(store: Arc<S>, cache: Arc<PermissionCache<S>>, metrics: Arc<Metrics>) -> Self {
        let enforcer = Enforcer::new(Arc::clone(&cache));
        Self {
            store,
            cache,
            enforcer,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<PermissionCache<S>> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Single permission check against the cached snapshot.
    pub fn check(
        &self,
        principal: &str,
        permission: Permission,
        resource: &Resource,
    ) -> Result<(), ApiError> {
        let result = self.enforcer.authorize(principal, permission, resource);
        self.metrics.record_check(result.is_ok());
        result.map_err(ApiError::from)
    }

    /// Authorizes `statement` for `principal` and applies its effect on the
    /// permission store.
    pub async fn execute(&self, principal: &str, statement: &Statement) -> Result<Outcome, ApiError> {
        self.authorize(principal, statement)?;
        self.apply(principal, statement).await
    }

    /// Validates the statement up front so malformed input fails at prepare
    /// time. Authorization happens on each execution.
    pub fn prepare(&self, statement: Statement) -> Result<PreparedStatement, ApiError> {
        statement.validate()?;
        Ok(PreparedStatement {
            statement: Arc::new(statement),
        })
    }

    pub async fn execute_prepared(
        &self,
        principal: &str,
        prepared: &PreparedStatement,
    ) -> Result<Outcome, ApiError> {
        self.execute(principal, &prepared.statement).await
    }

    /// Password authentication. All failures produce the same error so the
    /// caller cannot tell unknown roles from bad passwords.
    pub async fn login(&self, username: &str, password: &str) -> Result<Role, ApiError> {
        let fail = |reason: &str| {
            audit::audit_login_failure(username, reason);
            ApiError::AuthenticationFailed(username.to_string())
        };

        let Some(role) = self.store.get_role(username).await? else {
            return Err(fail("unknown role"));
        };
        if !role.can_login {
            return Err(fail("role is not permitted to log in"));
        }
        let Some(hash) = role.password_hash.as_deref() else {
            return Err(fail("role has no password"));
        };
        if !verify_password(password, hash)? {
            return Err(fail("password mismatch"));
        }

        audit::audit_login_success(username);
        Ok(role)
    }

    /// Creates the superuser role when the store has none by that name.
    /// Returns whether a role was created.
    pub async fn ensure_superuser(&self, name: &str, password: Option<&str>) -> Result<bool, ApiError> {
        if self.store.get_role(name).await?.is_some() {
            tracing::debug!(role = name, "superuser already present");
            return Ok(false);
        }

        let mut role = Role::new(name).with_superuser(true).with_login(true);
        if let Some(password) = password {
            role = role.with_password_hash(hash_password(password)?);
        } else {
            tracing::warn!(role = name, "bootstrapping superuser without a password");
        }

        match self.store.create_role(role, None).await {
            Ok(()) => {
                tracing::info!(role = name, "superuser created");
                audit::audit_role_created("bootstrap", name, true, true);
                Ok(true)
            }
            // another node got there first
            Err(StorageError::RoleAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn authorize(&self, principal: &str, statement: &Statement) -> Result<(), ApiError> {
        let result = self.enforcer.authorize_statement(principal, statement);
        let denied = matches!(
            result,
            Err(AuthzError::Unauthorized { .. }
                | AuthzError::SuperuserRequired(_)
                | AuthzError::SelfEscalationDenied)
        );
        self.metrics.record_check(result.is_ok());

        if let Err(e) = &result
            && denied
        {
            if self.enforcer.reader().current().is_none() {
                tracing::warn!(principal, "permission cache is empty, denying");
            }
            audit::audit_denied(principal, statement.name(), &e.to_string());
        }
        result.map_err(ApiError::from)
    }

    async fn apply(&self, principal: &str, statement: &Statement) -> Result<Outcome, ApiError> {
        match statement {
            Statement::CreateKeyspace { keyspace } => {
                self.object_created(principal, &Resource::keyspace(keyspace))
                    .await
            }
            Statement::CreateTable(table) => {
                self.object_created(principal, &table.resource()).await
            }
            Statement::DropKeyspace { keyspace } => {
                self.object_dropped(principal, &Resource::keyspace(keyspace))
                    .await
            }
            Statement::DropTable(table) => self.object_dropped(principal, &table.resource()).await,

            Statement::AlterTable(_)
            | Statement::CreateIndex { .. }
            | Statement::DropIndex { .. }
            | Statement::CreateType { .. }
            | Statement::DropType { .. }
            | Statement::Select(_)
            | Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_)
            | Statement::Truncate(_) => Ok(Outcome::Done),

            Statement::CreateRole { role, properties } => {
                self.create_role(principal, role, properties).await
            }
            Statement::AlterRole { role, properties } => {
                self.alter_role(principal, role, properties).await
            }
            Statement::DropRole { role } => {
                self.store.drop_role(role).await?;
                audit::audit_role_dropped(principal, role);
                Ok(Outcome::Done)
            }

            Statement::GrantRole { granted, recipient } => {
                if self.store.grant_role(granted, recipient).await? {
                    audit::audit_role_granted(principal, granted, recipient);
                }
                Ok(Outcome::Done)
            }
            Statement::RevokeRole { granted, recipient } => {
                if self.store.revoke_role(granted, recipient).await? {
                    audit::audit_role_revoked(principal, granted, recipient);
                }
                Ok(Outcome::Done)
            }

            Statement::GrantPermission {
                permissions,
                resource,
                grantee,
            } => {
                let requested = permissions.resolve(resource)?;
                let added = self
                    .store
                    .grant_permissions(grantee, resource, requested)
                    .await?;
                if !added.is_empty() {
                    audit::audit_permissions_granted(principal, grantee, resource, added);
                }
                Ok(Outcome::Done)
            }
            Statement::RevokePermission {
                permissions,
                resource,
                revokee,
            } => {
                let requested = permissions.resolve(resource)?;
                let removed = self
                    .store
                    .revoke_permissions(revokee, resource, requested)
                    .await?;
                if !removed.is_empty() {
                    audit::audit_permissions_revoked(principal, revokee, resource, removed);
                }
                Ok(Outcome::Done)
            }

            Statement::ListRoles { of } => self.list_roles(of.as_deref()).await,
            Statement::ListPermissions { of, resource } => {
                self.list_permissions(of.as_deref(), resource.as_ref())
                    .await
            }
        }
    }

    async fn object_created(&self, principal: &str, resource: &Resource) -> Result<Outcome, ApiError> {
        let granted = self.store.on_object_created(resource, principal).await?;
        audit::audit_object_created(principal, resource, granted);
        Ok(Outcome::Done)
    }

    async fn object_dropped(&self, principal: &str, resource: &Resource) -> Result<Outcome, ApiError> {
        let removed = self.store.on_object_dropped(resource).await?;
        audit::audit_object_dropped(principal, resource, removed);
        Ok(Outcome::Done)
    }

    async fn create_role(
        &self,
        principal: &str,
        name: &str,
        properties: &RoleProperties,
    ) -> Result<Outcome, ApiError> {
        let mut role = Role::new(name)
            .with_login(properties.login.unwrap_or(false))
            .with_superuser(properties.superuser.unwrap_or(false));
        if let Some(password) = &properties.password {
            role = role.with_password_hash(hash_password(password)?);
        }
        let (superuser, login) = (role.is_superuser, role.can_login);

        self.store.create_role(role, Some(principal)).await?;
        audit::audit_role_created(principal, name, superuser, login);
        Ok(Outcome::Done)
    }

    async fn alter_role(
        &self,
        principal: &str,
        name: &str,
        properties: &RoleProperties,
    ) -> Result<Outcome, ApiError> {
        let password_hash = properties
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;
        let options = RoleOptions {
            can_login: properties.login,
            is_superuser: properties.superuser,
            password_hash,
        };

        self.store.alter_role(name, &options).await?;
        audit::audit_role_altered(
            principal,
            name,
            properties.superuser,
            properties.login,
            properties.password.is_some(),
        );
        Ok(Outcome::Done)
    }

    /// With `of`, the roles `of` belongs to (itself included), read from the
    /// store rather than the cache.
    async fn list_roles(&self, of: Option<&str>) -> Result<Outcome, ApiError> {
        let roles = self.store.list_roles().await?;
        let Some(of) = of else {
            return Ok(Outcome::Roles(roles));
        };
        if !roles.iter().any(|r| r.name == of) {
            return Err(StorageError::RoleNotFound(of.to_string()).into());
        }

        let snapshot = self.store.load_snapshot().await?;
        let effective = snapshot.effective_roles(of);
        Ok(Outcome::Roles(
            roles
                .into_iter()
                .filter(|r| effective.contains(&r.name))
                .collect(),
        ))
    }

    /// With `resource`, only rows on it or on one of its ancestors.
    async fn list_permissions(
        &self,
        of: Option<&str>,
        resource: Option<&Resource>,
    ) -> Result<Outcome, ApiError> {
        if let Some(of) = of
            && self.store.get_role(of).await?.is_none()
        {
            return Err(StorageError::RoleNotFound(of.to_string()).into());
        }

        let mut grants = self.store.list_permissions(of).await?;
        if let Some(resource) = resource {
            grants.retain(|g| resource.ancestors().any(|a| a == g.resource));
        }
        Ok(Outcome::Permissions(grants))
    }
}
