use warden_core::engine::AuthzError;
use warden_core::validation::ValidationError;
use warden_storage::StorageError;

use crate::password::PasswordError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("password hashing failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Provided username {0} and/or password are incorrect")]
    AuthenticationFailed(String),
}

impl ApiError {
    /// True for decisions made by the enforcer, as opposed to failures.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            ApiError::Authz(
                AuthzError::Unauthorized { .. }
                    | AuthzError::SuperuserRequired(_)
                    | AuthzError::SelfEscalationDenied
            )
        )
    }
}
