use std::fmt::Display;

use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use super::validation::ValidationError;

/// Failures of the resume lifecycle. Client-correctable variants carry their
/// reason; infrastructure failures are logged where they happen and stay opaque.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid resume name: {0}")]
    InvalidName(String),

    #[error("all resume slots are in use; delete a resume first")]
    SlotExhausted,

    #[error("resume not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("preview generation failed")]
    PreviewFailed,

    #[error("storage temporarily unavailable")]
    StoreUnavailable,
}

/// Log an infrastructure failure with full context and return the opaque error.
pub(crate) fn store_failure(
    operation: &'static str,
    owner: Uuid,
    resume_id: Option<Uuid>,
    cause: impl Display,
) -> ResumeError {
    error!(
        operation,
        owner = %owner,
        resume_id = ?resume_id,
        cause = %cause,
        "resume store failure"
    );
    ResumeError::StoreUnavailable
}
