//! CAF status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::caf::CafError;
use crate::caf::trigger::{AckStatus, Trigger};

/// The state of a CAF in its activation lifecycle.
///
/// State transitions:
/// ```text
/// PendingApproval ─┬─► Approved ─► PreactSent ─┬─► PreactDone ─► TvSent ─┬─► TvDone ─► FinalactSent ─┐
///                  └─► Rejected                └─► PreactFailed          └─► TvFailed                 │
///                                                                                                    │
///   ┌────────────────────────────────────────────────────────────────────────────────────────────────┘
///   ├─► FinalactFailed
///   └─► FinalactDone ─┬─► Completed                      (no POS agent)
///                     └─► CommissionSent ─┬─► Completed
///                                         └─► CommissionFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CafStatus {
    /// Ingested, waiting for the CSC decision.
    PendingApproval,
    /// Approved by CSC; pre-activation is due.
    Approved,
    /// Rejected by CSC (terminal state).
    Rejected,
    PreactSent,
    PreactDone,
    /// Pre-activation was refused or could not be delivered (terminal state).
    PreactFailed,
    TvSent,
    TvDone,
    /// Tele-verification failed (terminal state).
    TvFailed,
    FinalactSent,
    FinalactDone,
    /// Final activation failed (terminal state).
    FinalactFailed,
    CommissionSent,
    /// Commission settlement failed (terminal state).
    CommissionFailed,
    /// Activation finished (terminal state).
    Completed,
}

impl CafStatus {
    /// Every status, in pipeline order.
    pub const ALL: [CafStatus; 15] = [
        CafStatus::PendingApproval,
        CafStatus::Approved,
        CafStatus::Rejected,
        CafStatus::PreactSent,
        CafStatus::PreactDone,
        CafStatus::PreactFailed,
        CafStatus::TvSent,
        CafStatus::TvDone,
        CafStatus::TvFailed,
        CafStatus::FinalactSent,
        CafStatus::FinalactDone,
        CafStatus::FinalactFailed,
        CafStatus::CommissionSent,
        CafStatus::CommissionFailed,
        CafStatus::Completed,
    ];

    /// Integer mirror of the status; 0 for every failure sink.
    pub fn step(&self) -> u8 {
        match self {
            CafStatus::PendingApproval => 1,
            CafStatus::Approved => 2,
            CafStatus::PreactSent => 3,
            CafStatus::PreactDone => 4,
            CafStatus::TvSent => 5,
            CafStatus::TvDone => 6,
            CafStatus::FinalactSent => 7,
            CafStatus::FinalactDone => 8,
            CafStatus::CommissionSent | CafStatus::Completed => 9,
            CafStatus::Rejected
            | CafStatus::PreactFailed
            | CafStatus::TvFailed
            | CafStatus::FinalactFailed
            | CafStatus::CommissionFailed => 0,
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        self.is_failure() || matches!(self, CafStatus::Completed)
    }

    /// Returns true for the failure sinks.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CafStatus::Rejected
                | CafStatus::PreactFailed
                | CafStatus::TvFailed
                | CafStatus::FinalactFailed
                | CafStatus::CommissionFailed
        )
    }

    /// Looks up the transition table.
    ///
    /// Returns the destination state, or `CafError::InvalidTransition` when the
    /// trigger is not legal from this state.
    pub fn next(self, trigger: &Trigger) -> Result<CafStatus, CafError> {
        let next = match (self, trigger) {
            (CafStatus::PendingApproval, Trigger::CscDecision { approved: true }) => {
                Some(CafStatus::Approved)
            }
            (CafStatus::PendingApproval, Trigger::CscDecision { approved: false }) => {
                Some(CafStatus::Rejected)
            }
            (from, Trigger::Dispatched(target)) if from == target.ready_status() => {
                Some(target.sent_status())
            }
            (from, Trigger::Ack { target, status }) if from == target.sent_status() => {
                Some(match status {
                    AckStatus::Success => target.done_status(),
                    AckStatus::Failure => target.failed_status(),
                })
            }
            (CafStatus::FinalactDone, Trigger::CommissionSkipped) => Some(CafStatus::Completed),
            _ => None,
        };

        next.ok_or_else(|| CafError::InvalidTransition {
            from: self,
            trigger: trigger.label(),
        })
    }

    /// Returns the state name as stored and reported.
    pub fn as_str(&self) -> &'static str {
        match self {
            CafStatus::PendingApproval => "PENDING_APPROVAL",
            CafStatus::Approved => "APPROVED",
            CafStatus::Rejected => "REJECTED",
            CafStatus::PreactSent => "PREACT_SENT",
            CafStatus::PreactDone => "PREACT_DONE",
            CafStatus::PreactFailed => "PREACT_FAILED",
            CafStatus::TvSent => "TV_SENT",
            CafStatus::TvDone => "TV_DONE",
            CafStatus::TvFailed => "TV_FAILED",
            CafStatus::FinalactSent => "FINALACT_SENT",
            CafStatus::FinalactDone => "FINALACT_DONE",
            CafStatus::FinalactFailed => "FINALACT_FAILED",
            CafStatus::CommissionSent => "COMMISSION_SENT",
            CafStatus::CommissionFailed => "COMMISSION_FAILED",
            CafStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for CafStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CafStatus {
    type Err = CafError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CafStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CafError::UnknownStatus(s.to_string()))
    }
}
