//! Saga error types.

use common::{CafRefNo, CorrelationId};
use domain::{CafError, CafStatus, DomainError, Target, ValidationError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The submission failed boundary validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No CAF exists with the given reference number.
    #[error("CAF not found: {0}")]
    CafNotFound(CafRefNo),

    /// The CAF is not in the state the operation requires.
    #[error("State conflict for CAF {caf_ref_no}: {reason}")]
    StateConflict {
        caf_ref_no: CafRefNo,
        status: CafStatus,
        reason: String,
    },

    /// A callback did not match any outbox entry, or named the wrong CAF.
    #[error("Callback mismatch for {correlation_id}: {reason}")]
    CallbackMismatch {
        correlation_id: CorrelationId,
        reason: String,
    },

    /// A SYNC dispatch exhausted its retries.
    #[error("Dispatch of {target} failed for {correlation_id}: {reason}")]
    DispatchFailed {
        correlation_id: CorrelationId,
        target: Target,
        reason: String,
    },

    /// A back-office call failed in transport (connection, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The identity-provisioning collaborator could not supply a permanent IMSI.
    #[error("Identity provisioning error: {0}")]
    IdentityProvisioning(String),

    /// The SYNC worker pool is no longer accepting jobs.
    #[error("SYNC worker pool is shut down")]
    WorkerPoolClosed,

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SagaError {
    pub(crate) fn from_transition(caf_ref_no: &CafRefNo, status: CafStatus, err: CafError) -> Self {
        match err {
            CafError::InvalidTransition { .. } => SagaError::StateConflict {
                caf_ref_no: caf_ref_no.clone(),
                status,
                reason: err.to_string(),
            },
            other => SagaError::Domain(other.into()),
        }
    }

    /// Returns true for failures a retry may cure.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::Transport(_) => true,
            SagaError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
