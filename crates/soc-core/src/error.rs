//! Shared error taxonomy (§7 of the specification).

use thiserror::Error;

/// Errors common to every layer above the storage adapters.
#[derive(Debug, Error)]
pub enum SocError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("audit chain integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SocError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::DeadlineExceeded(_))
    }
}
