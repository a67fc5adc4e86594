//! Integration outbox entries.
//!
//! Every dispatch to a back-office system is recorded here before anything
//! leaves the process. ASYNC entries are consumed by downstream batch jobs;
//! SYNC entries are delivered by the orchestrator's own worker pool.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{CafId, CafRefNo, CorrelationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caf::AckStatus;
use crate::zone::{IntegrationMode, Target};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown outbox status: {0}")]
pub struct UnknownOutboxStatus(pub String);

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Acked,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Acked => "ACKED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OutboxStatus::Pending)
    }
}

impl From<AckStatus> for OutboxStatus {
    fn from(status: AckStatus) -> Self {
        match status {
            AckStatus::Success => OutboxStatus::Acked,
            AckStatus::Failure => OutboxStatus::Failed,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = UnknownOutboxStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "ACKED" => Ok(OutboxStatus::Acked),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(UnknownOutboxStatus(other.to_string())),
        }
    }
}

/// A durable request to one integration target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub correlation_id: CorrelationId,
    pub caf_id: CafId,
    pub caf_ref_no: CafRefNo,
    pub target: Target,
    pub mode: IntegrationMode,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    /// Enqueue attempts, plus one per SYNC call made by the worker pool.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Creates a `PENDING` entry with a freshly generated correlation id.
    pub fn pending(
        caf_id: CafId,
        caf_ref_no: CafRefNo,
        target: Target,
        mode: IntegrationMode,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id: CorrelationId::generate(target.as_str(), &caf_ref_no),
            caf_id,
            caf_ref_no,
            target,
            mode,
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_entry_has_prefixed_correlation_id() {
        let ref_no = CafRefNo::parse("CAF-7").unwrap();
        let entry = OutboxEntry::pending(
            CafId::new(),
            ref_no,
            Target::FinalAct,
            IntegrationMode::Sync,
            json!({}),
            Utc::now(),
        );
        assert!(entry.is_pending());
        assert_eq!(entry.attempts, 0);
        assert!(entry.correlation_id.as_str().starts_with("FINALACT-CAF-7-"));
    }

    #[test]
    fn test_status_from_ack() {
        assert_eq!(OutboxStatus::from(AckStatus::Success), OutboxStatus::Acked);
        assert_eq!(OutboxStatus::from(AckStatus::Failure), OutboxStatus::Failed);
        assert_eq!("ACKED".parse::<OutboxStatus>().unwrap(), OutboxStatus::Acked);
        assert!("acked".parse::<OutboxStatus>().is_err());
    }
}
