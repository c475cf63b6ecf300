use castellan_registry::ObjectId;
use thiserror::Error;

/// A permission failure is always surfaced as `NotFound`: the caller must not be
/// able to distinguish "doesn't exist" from "exists, but you can't see it".
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("invalid request: {0}")]
    Validation(String),
}

pub type FacadeResult<T> = Result<T, FacadeError>;
