//! Shared identifier types for the CAF activation saga.

pub mod types;

pub use types::{CafId, CafRefNo, CorrelationId, IdentifierError, MAX_CAF_REF_NO_LEN, ZoneCode};
