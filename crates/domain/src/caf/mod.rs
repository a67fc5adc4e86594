//! CAF aggregate, state machine, and triggers.

mod aggregate;
mod state;
mod trigger;

pub use aggregate::Caf;
pub use state::CafStatus;
pub use trigger::{AckStatus, Trigger};

use common::CafRefNo;
use thiserror::Error;

/// Errors raised by the CAF aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CafError {
    /// The trigger is not legal from the CAF's current state.
    #[error("Invalid state transition: cannot apply {trigger} in {from} state")]
    InvalidTransition { from: CafStatus, trigger: String },

    /// A USIM case was ingested without a permanent IMSI.
    #[error("USIM case {0} has no permanent IMSI")]
    MissingPermanentImsi(CafRefNo),

    #[error("Unknown CAF status: {0}")]
    UnknownStatus(String),

    #[error("Unknown acknowledgement status: {0}")]
    UnknownAckStatus(String),
}
