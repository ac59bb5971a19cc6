use crate::permission::PermissionSet;
use crate::resource::{Resource, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed resource name: '{0}'")]
    MalformedResource(String),

    #[error("unknown permission: '{0}'")]
    UnknownPermission(String),

    #[error("Resource type {} does not support any of the requested permissions", .kind.family())]
    UnsupportedPermission {
        kind: ResourceKind,
        permissions: PermissionSet,
    },

    #[error("{granted} is a member of {recipient}")]
    CyclicMembership { granted: String, recipient: String },

    #[error("line 1: expecting WITH")]
    MissingRoleOptions,

    #[error("{0} is not an individual object")]
    NotAnObject(String),

    #[error("empty permission set")]
    EmptyPermissionSet,
}

/// Rejects a grant or revoke naming permissions outside what `resource`
/// supports. The offending subset is carried in the error.
pub fn validate_grant(resource: &Resource, permissions: PermissionSet) -> Result<(), ValidationError> {
    resource.validate()?;
    if permissions.is_empty() {
        return Err(ValidationError::EmptyPermissionSet);
    }

    let unsupported = permissions.difference(resource.supported_permissions());
    if !unsupported.is_empty() {
        return Err(ValidationError::UnsupportedPermission {
            kind: resource.kind(),
            permissions: unsupported,
        });
    }
    Ok(())
}

/// Object lifecycle hooks only accept concrete keyspaces, tables and roles.
pub fn validate_object(resource: &Resource) -> Result<(), ValidationError> {
    if !resource.kind().is_object() {
        return Err(ValidationError::NotAnObject(resource.canonical()));
    }
    resource.validate()
}
