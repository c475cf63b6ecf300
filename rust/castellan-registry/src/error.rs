use thiserror::Error;

use crate::object::ObjectId;

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while activating, looking up, or tearing down registry objects.
///
/// Validation errors are fatal only at activation time -- once an object is active,
/// the same variant returned from a mutating call must leave the registry consistent.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object already exists: {0}")]
    AlreadyExists(ObjectId),

    #[error("validation failed for {object}: {reason}")]
    Validation { object: ObjectId, reason: String },

    #[error("object {0} is not in a state that permits this operation")]
    InvalidLifecycle(ObjectId),

    #[error("dependency cycle detected starting at {0}")]
    DependencyCycle(ObjectId),
}
