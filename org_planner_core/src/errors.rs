//! Error type shared by the kernel and the runtime.

use thiserror::Error;

use crate::domain::EntityKind;

/// Every failure a planner operation can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced id does not resolve.
    #[error("{kind} {id:?} not found")]
    NotFound { kind: EntityKind, id: String },

    /// The operation would break a referential rule (e.g. deleting an occupied role).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The external document store rejected or failed the write/read.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A write was attempted without edit capability.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Another assignment operation on the same record has not resolved yet.
    #[error("busy: assignment already in flight for {0:?}")]
    Busy(String),
}

impl PlannerError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        PlannerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PlannerError::Validation(msg.into())
    }
}

pub type PlannerResult<T> = Result<T, PlannerError>;
