//! Domain error types.

use thiserror::Error;

use crate::caf::CafError;
use crate::outbox::UnknownOutboxStatus;
use crate::submission::ValidationError;
use crate::zone::ZoneError;

/// Errors that can occur in the domain layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("CAF error: {0}")]
    Caf(#[from] CafError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Zone error: {0}")]
    Zone(#[from] ZoneError),

    #[error(transparent)]
    Outbox(#[from] UnknownOutboxStatus),
}
