pub mod engine;
pub mod graph;
pub mod permission;
pub mod resource;
pub mod role;
pub mod snapshot;
pub mod validation;

pub use engine::{AuthzError, Enforcer, SnapshotReader, Statement};
pub use permission::{Permission, PermissionGrant, PermissionSet};
pub use resource::{Resource, ResourceKind};
pub use role::{Role, RoleOptions};
pub use snapshot::AuthSnapshot;
pub use validation::ValidationError;
