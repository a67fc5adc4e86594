//! Append-only transition audit trail.

use chrono::{DateTime, Utc};
use common::{CafId, CafRefNo, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::caf::{Caf, CafStatus};

/// One state change of a CAF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub caf_id: CafId,
    pub caf_ref_no: CafRefNo,
    /// `None` for the ingestion record.
    pub from: Option<CafStatus>,
    pub to: CafStatus,
    pub trigger: String,
    pub actor: Option<String>,
    pub detail: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    pub occurred_at: DateTime<Utc>,
}

impl TransitionRecord {
    pub(crate) fn new(
        caf: &Caf,
        from: Option<CafStatus>,
        trigger: String,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            caf_id: caf.id,
            caf_ref_no: caf.caf_ref_no.clone(),
            from,
            to: caf.status,
            trigger,
            actor: None,
            detail: None,
            correlation_id: None,
            occurred_at,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}
