//! Orchestration of the CAF activation saga.
//!
//! An approved CAF moves through four back-office integrations in order:
//! 1. Pre-activation (PREACT)
//! 2. Tele-verification (TV)
//! 3. Final activation (FINALACT)
//! 4. Commission, only for cases sold by a POS agent
//!
//! Each step is recorded as an outbox entry with a correlation id. The step
//! completes when an acknowledgement for that id arrives, either from a
//! callback (ASYNC zones) or from the worker pool's direct call (SYNC zones).
//! A failed step parks the CAF in the matching failure state.

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod locks;
pub mod retry;
pub mod sequencer;
pub mod services;
pub mod tracker;
pub mod worker;
pub mod zone;

pub use coordinator::{AdvanceOutcome, CafSummary, IngestOutcome, Orchestrator, OrchestratorConfig};
pub use dispatcher::{Dispatcher, build_payload, callback_url};
pub use error::SagaError;
pub use locks::CafLocks;
pub use retry::RetryPolicy;
pub use sequencer::NextAction;
pub use services::{
    IdentityProvisioning, InMemoryIdentityProvisioning, InMemoryIntegrationClient,
    IntegrationClient,
};
pub use tracker::{AckOutcome, CallbackProcessor};
pub use worker::{SyncJob, SyncJobHandler, SyncWorkerPool};
pub use zone::{Resolved, ZoneResolver};
