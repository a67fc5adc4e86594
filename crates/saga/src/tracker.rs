//! Correlation tracker: applies acknowledgements to outbox entries.

use chrono::Utc;
use common::{CafRefNo, CorrelationId};
use domain::{AckStatus, Caf, OutboxEntry, Trigger};
use store::{OrchestrationStore, StoreError};

use crate::error::{Result, SagaError};

/// Result of applying an acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// The entry was resolved and the CAF moved on.
    Applied { caf: Caf, entry: OutboxEntry },
    /// The entry had already been resolved; nothing changed.
    Duplicate { entry: OutboxEntry },
}

impl AckOutcome {
    pub fn entry(&self) -> &OutboxEntry {
        match self {
            AckOutcome::Applied { entry, .. } | AckOutcome::Duplicate { entry } => entry,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AckOutcome::Duplicate { .. })
    }
}

#[derive(Clone)]
pub struct CallbackProcessor<S> {
    store: S,
}

impl<S: OrchestrationStore> CallbackProcessor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Finds the entry for `correlation_id` and checks it belongs to `caf_ref_no`, if given.
    pub async fn lookup(
        &self,
        correlation_id: &CorrelationId,
        caf_ref_no: Option<&CafRefNo>,
    ) -> Result<OutboxEntry> {
        let Some(entry) = self.store.get_outbox(correlation_id).await? else {
            return Err(mismatch(correlation_id, "unknown correlation id".to_string()));
        };

        if let Some(claimed) = caf_ref_no
            && claimed != &entry.caf_ref_no
        {
            return Err(mismatch(
                correlation_id,
                format!("belongs to {}, not {claimed}", entry.caf_ref_no),
            ));
        }

        Ok(entry)
    }

    /// Resolves the entry and applies the CAF transition as one unit.
    ///
    /// The caller must hold the CAF's lock. `error` is stored as the entry's
    /// `last_error` and as the transition detail.
    pub async fn apply(
        &self,
        correlation_id: &CorrelationId,
        status: AckStatus,
        error: Option<String>,
    ) -> Result<AckOutcome> {
        let entry = self.lookup(correlation_id, None).await?;
        if !entry.is_pending() {
            return Ok(duplicate(entry));
        }

        let mut caf = self
            .store
            .get_caf(&entry.caf_ref_no)
            .await?
            .ok_or_else(|| SagaError::CafNotFound(entry.caf_ref_no.clone()))?;
        let expected = caf.status;

        let trigger = Trigger::Ack {
            target: entry.target,
            status,
        };
        let mut record = caf
            .transition(&trigger, Utc::now())
            .map_err(|e| SagaError::from_transition(&caf.caf_ref_no, expected, e))?
            .with_correlation_id(correlation_id.clone());
        if let Some(ref error) = error {
            record = record.with_detail(error.clone());
        }

        let resolved = self
            .store
            .resolve_outbox(correlation_id, status.into(), error, &caf, expected, record)
            .await;

        match resolved {
            Ok(entry) => {
                metrics::counter!(
                    "callbacks_applied_total",
                    "target" => entry.target.as_str(),
                    "status" => status.as_str()
                )
                .increment(1);
                tracing::info!(
                    caf_ref_no = %caf.caf_ref_no,
                    correlation_id = %correlation_id,
                    target = %entry.target,
                    ack_status = %status,
                    status = %caf.status,
                    "acknowledgement applied"
                );
                Ok(AckOutcome::Applied { caf, entry })
            }
            Err(StoreError::OutboxNotPending { .. }) => {
                let entry = self.lookup(correlation_id, None).await?;
                Ok(duplicate(entry))
            }
            Err(StoreError::StaleStatus { actual, .. }) => Err(SagaError::StateConflict {
                caf_ref_no: caf.caf_ref_no.clone(),
                status: actual,
                reason: format!("{} acknowledgement expected {expected}", entry.target),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn mismatch(correlation_id: &CorrelationId, reason: String) -> SagaError {
    metrics::counter!("callback_mismatch_total").increment(1);
    tracing::warn!(correlation_id = %correlation_id, reason = %reason, "callback mismatch");
    SagaError::CallbackMismatch {
        correlation_id: correlation_id.clone(),
        reason,
    }
}

fn duplicate(entry: OutboxEntry) -> AckOutcome {
    metrics::counter!("callbacks_duplicate_total", "target" => entry.target.as_str()).increment(1);
    tracing::info!(
        caf_ref_no = %entry.caf_ref_no,
        correlation_id = %entry.correlation_id,
        status = %entry.status,
        "duplicate acknowledgement ignored"
    );
    AckOutcome::Duplicate { entry }
}
