//! Triggers that drive the CAF state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caf::CafError;
use crate::zone::Target;

/// Outcome reported by a back-office integration.
///
/// Parsing is case-insensitive and tolerates surrounding whitespace; `FAILED`
/// is accepted as an alias of `FAILURE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum AckStatus {
    Success,
    Failure,
}

impl AckStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AckStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Success => "SUCCESS",
            AckStatus::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for AckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AckStatus {
    type Err = CafError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(AckStatus::Success),
            "FAILURE" | "FAILED" => Ok(AckStatus::Failure),
            _ => Err(CafError::UnknownAckStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for AckStatus {
    type Error = CafError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Something that asks the CAF to change state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// First ingestion of a submission.
    Ingested,
    /// Step 2: the CSC approved or rejected the case.
    CscDecision { approved: bool },
    /// An integration request for `target` was recorded in the outbox.
    Dispatched(Target),
    /// The integration for `target` acknowledged its request.
    Ack { target: Target, status: AckStatus },
    /// Final activation finished for a case without a POS agent.
    CommissionSkipped,
}

impl Trigger {
    /// Short label recorded in the transition audit trail.
    pub fn label(&self) -> String {
        match self {
            Trigger::Ingested => "INGESTED".to_string(),
            Trigger::CscDecision { approved: true } => "CSC_APPROVED".to_string(),
            Trigger::CscDecision { approved: false } => "CSC_REJECTED".to_string(),
            Trigger::Dispatched(target) => format!("{target}_DISPATCHED"),
            Trigger::Ack { target, status } => format!("{target}_ACK_{status}"),
            Trigger::CommissionSkipped => "COMMISSION_SKIPPED".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_status_is_case_insensitive() {
        assert_eq!("success".parse::<AckStatus>().unwrap(), AckStatus::Success);
        assert_eq!(" Failure ".parse::<AckStatus>().unwrap(), AckStatus::Failure);
        assert_eq!("FAILED".parse::<AckStatus>().unwrap(), AckStatus::Failure);
        assert!("maybe".parse::<AckStatus>().is_err());
    }

    #[test]
    fn ack_status_deserializes_leniently() {
        let s: AckStatus = serde_json::from_str("\"sUcCeSs\"").unwrap();
        assert_eq!(s, AckStatus::Success);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"SUCCESS\"");
        assert!(serde_json::from_str::<AckStatus>("\"OK\"").is_err());
    }

    #[test]
    fn trigger_labels() {
        assert_eq!(Trigger::Dispatched(Target::Tv).label(), "TV_DISPATCHED");
        assert_eq!(
            Trigger::Ack {
                target: Target::PreAct,
                status: AckStatus::Failure
            }
            .label(),
            "PREACT_ACK_FAILURE"
        );
    }
}
