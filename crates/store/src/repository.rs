use async_trait::async_trait;
use common::{CafRefNo, CorrelationId, ZoneCode};
use domain::{
    AgentZone, Caf, CafStatus, IntegrationMode, OutboxEntry, OutboxStatus, TransitionRecord,
    ZoneConfig,
};

use crate::Result;

/// Result of an idempotent CAF insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The CAF was inserted.
    Created(Caf),
    /// A CAF with the same reference number already existed; it is returned unchanged.
    Existing(Caf),
}

impl CreateOutcome {
    pub fn caf(&self) -> &Caf {
        match self {
            CreateOutcome::Created(caf) | CreateOutcome::Existing(caf) => caf,
        }
    }
}

/// Persistence of CAF records and their transition audit trail.
#[async_trait]
pub trait CafRepository: Send + Sync {
    /// Inserts the CAF and its ingestion record unless the reference number exists.
    async fn create_if_absent(&self, caf: Caf, record: TransitionRecord) -> Result<CreateOutcome>;

    /// Loads a CAF by reference number.
    async fn get_caf(&self, caf_ref_no: &CafRefNo) -> Result<Option<Caf>>;

    /// Writes the CAF's new status if the stored status still equals `expected`,
    /// appending `record` in the same unit.
    ///
    /// Returns `StaleStatus` when the stored status differs.
    async fn update_status(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<()>;

    /// Returns the audit trail of a CAF, oldest first.
    async fn transitions(&self, caf_ref_no: &CafRefNo) -> Result<Vec<TransitionRecord>>;
}

/// Read and bookkeeping access to integration outbox entries.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn get_outbox(&self, correlation_id: &CorrelationId) -> Result<Option<OutboxEntry>>;

    /// Entries for one CAF in creation order.
    async fn list_outbox(&self, caf_ref_no: &CafRefNo) -> Result<Vec<OutboxEntry>>;

    /// PENDING entries of one mode across all CAFs, oldest first.
    async fn list_pending(&self, mode: IntegrationMode) -> Result<Vec<OutboxEntry>>;

    /// Counts one SYNC delivery attempt, optionally noting its error.
    ///
    /// Only PENDING entries are touched; otherwise `OutboxNotPending` is returned.
    async fn record_attempt(
        &self,
        correlation_id: &CorrelationId,
        error: Option<String>,
    ) -> Result<OutboxEntry>;
}

/// Read-only zone routing data.
#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn zone_config(&self, zone_code: &ZoneCode) -> Result<Option<ZoneConfig>>;

    async fn agent_zone(&self, hrno: &str) -> Result<Option<AgentZone>>;
}

/// Atomic units that span the CAF and the outbox.
#[async_trait]
pub trait OrchestrationStore: CafRepository + OutboxRepository + ZoneRepository {
    /// Persists a PENDING outbox entry and the CAF's move to its "sent" state together.
    ///
    /// Fails with `StaleStatus` or `OpenOutboxExists` without writing anything.
    async fn create_dispatch(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
        entry: OutboxEntry,
    ) -> Result<()>;

    /// Resolves a PENDING outbox entry and applies the matching CAF transition together.
    ///
    /// Fails with `OutboxNotPending` when the entry was already resolved.
    async fn resolve_outbox(
        &self,
        correlation_id: &CorrelationId,
        status: OutboxStatus,
        last_error: Option<String>,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<OutboxEntry>;
}
