//! Domain error types.

use thiserror::Error;

use crate::record::EventId;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An event record was not found.
    #[error("event record not found: {0}")]
    RecordNotFound(EventId),

    /// The caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
