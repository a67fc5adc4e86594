use common::{CafRefNo, CorrelationId, IdentifierError};
use domain::{CafStatus, DomainError, OutboxStatus, Target};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No CAF exists with the given reference number.
    #[error("CAF not found: {0}")]
    CafNotFound(CafRefNo),

    /// No outbox entry exists with the given correlation id.
    #[error("Outbox entry not found: {0}")]
    OutboxNotFound(CorrelationId),

    /// A conditional status update found the CAF in a different state.
    #[error("Stale status for CAF {caf_ref_no}: expected {expected}, found {actual}")]
    StaleStatus {
        caf_ref_no: CafRefNo,
        expected: CafStatus,
        actual: CafStatus,
    },

    /// The outbox entry has already been resolved.
    #[error("Outbox entry {correlation_id} is already {status}")]
    OutboxNotPending {
        correlation_id: CorrelationId,
        status: OutboxStatus,
    },

    /// A PENDING entry already exists for this CAF and target.
    #[error("CAF {caf_ref_no} already has an open {target} entry")]
    OpenOutboxExists { caf_ref_no: CafRefNo, target: Target },

    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelation(CorrelationId),

    /// The backing store could not be reached. Safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt row: {0}")]
    Domain(#[from] DomainError),

    #[error("Corrupt identifier: {0}")]
    Identifier(#[from] IdentifierError),
}

impl StoreError {
    /// Returns true for failures where nothing was written and a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
