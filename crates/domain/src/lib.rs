//! Domain layer for the CAF activation saga.
//!
//! This crate provides:
//! - The `Caf` aggregate and its transition table
//! - Submission validation and USIM classification
//! - Integration targets, modes, and zone routing
//! - Outbox entries and the transition audit record

pub mod audit;
pub mod caf;
pub mod error;
pub mod outbox;
pub mod submission;
pub mod zone;

pub use audit::TransitionRecord;
pub use caf::{AckStatus, Caf, CafError, CafStatus, Trigger};
pub use error::DomainError;
pub use outbox::{OutboxEntry, OutboxStatus, UnknownOutboxStatus};
pub use submission::{
    Customer, MAX_ACTOR_LEN, MAX_HRNO_LEN, MAX_PLAN_CODE_LEN, Submission, UsimPlans,
    ValidatedSubmission, ValidationError, check_len,
};
pub use zone::{AgentZone, IntegrationMode, Target, ZoneConfig, ZoneError};
