mod enforcer;
mod statement;

pub use enforcer::Enforcer;
pub use statement::{PermissionSpec, Requirement, RoleProperties, Statement, TableRef};

use std::sync::Arc;

use crate::permission::Permission;
use crate::resource::Resource;
use crate::snapshot::AuthSnapshot;
use crate::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("User {role} has no {permission} permission on {} or any of its parents", .resource.label())]
    Unauthorized {
        role: String,
        permission: Permission,
        resource: Resource,
    },

    #[error("Only superusers are allowed to {0}")]
    SuperuserRequired(&'static str),

    #[error(
        "Unauthorized. You aren't allowed to alter your own superuser status or that of a role granted to you"
    )]
    SelfEscalationDenied,

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Source of the snapshot a decision is made against. Returns `None` until
/// the first snapshot has been loaded.
pub trait SnapshotReader: Send + Sync {
    fn current(&self) -> Option<Arc<AuthSnapshot>>;
}

impl SnapshotReader for Option<Arc<AuthSnapshot>> {
    fn current(&self) -> Option<Arc<AuthSnapshot>> {
        self.clone()
    }
}
