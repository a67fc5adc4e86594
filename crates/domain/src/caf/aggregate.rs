//! CAF aggregate.

use chrono::{DateTime, Utc};
use common::{CafId, CafRefNo, ZoneCode};
use serde::{Deserialize, Serialize};

use crate::audit::TransitionRecord;
use crate::caf::{CafError, CafStatus, Trigger};
use crate::submission::{Customer, ValidatedSubmission};

/// One customer-activation case.
///
/// Fields are plain data so stores can rehydrate rows; `status` must only be
/// changed through [`Caf::transition`], which consults the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caf {
    pub id: CafId,
    pub caf_ref_no: CafRefNo,
    pub plan_code: String,
    pub is_usim: bool,
    pub imsi: Option<String>,
    pub permanent_imsi: Option<String>,
    pub pos_agent_hrno: Option<String>,
    pub csc_hrno: Option<String>,
    pub zone_code: ZoneCode,
    pub is_agent: bool,
    pub customer: Customer,
    pub status: CafStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Caf {
    /// Creates a new case in `PENDING_APPROVAL` from a validated submission.
    ///
    /// `permanent_imsi` is required for USIM plans and discarded otherwise.
    pub fn ingest(
        submission: ValidatedSubmission,
        zone_code: ZoneCode,
        permanent_imsi: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Caf, TransitionRecord), CafError> {
        let permanent_imsi = if submission.is_usim {
            match permanent_imsi.filter(|p| !p.trim().is_empty()) {
                Some(p) => Some(p),
                None => return Err(CafError::MissingPermanentImsi(submission.caf_ref_no)),
            }
        } else {
            None
        };

        let caf = Caf {
            id: CafId::new(),
            is_agent: submission.pos_agent_hrno.is_some(),
            caf_ref_no: submission.caf_ref_no,
            plan_code: submission.plan_code,
            is_usim: submission.is_usim,
            imsi: submission.imsi,
            permanent_imsi,
            pos_agent_hrno: submission.pos_agent_hrno,
            csc_hrno: submission.csc_hrno,
            zone_code,
            customer: submission.customer,
            status: CafStatus::PendingApproval,
            created_at: now,
            updated_at: now,
        };

        let record = TransitionRecord::new(&caf, None, Trigger::Ingested.label(), now);
        Ok((caf, record))
    }

    /// Applies a trigger if it is legal from the current state.
    ///
    /// On success the status and `updated_at` change and an audit record is
    /// returned; on failure the CAF is left untouched.
    pub fn transition(
        &mut self,
        trigger: &Trigger,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, CafError> {
        let from = self.status;
        let to = from.next(trigger)?;
        self.status = to;
        self.updated_at = now;
        Ok(TransitionRecord::new(self, Some(from), trigger.label(), now))
    }

    /// Integer mirror of the status (0 once halted).
    pub fn current_step(&self) -> u8 {
        self.status.step()
    }

    /// IMSI to send downstream: the permanent IMSI for USIM cases, else the supplied one.
    pub fn effective_imsi(&self) -> Option<&str> {
        if self.is_usim
            && let Some(ref permanent) = self.permanent_imsi
        {
            return Some(permanent);
        }
        self.imsi.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caf::AckStatus;
    use crate::submission::{Submission, UsimPlans};
    use crate::zone::Target;

    fn validated(plan: &str, imsi: Option<&str>, agent: Option<&str>) -> ValidatedSubmission {
        Submission {
            caf_ref_no: Some("CAF-1001".into()),
            plan_code: Some(plan.into()),
            imsi: imsi.map(String::from),
            pos_agent_hrno: agent.map(String::from),
            ..Default::default()
        }
        .validate(&UsimPlans::default())
        .unwrap()
    }

    fn north() -> ZoneCode {
        ZoneCode::parse("NORTH").unwrap()
    }

    #[test]
    fn test_ingest_usim_stores_permanent_imsi() {
        let (caf, record) = Caf::ingest(
            validated("USIM001", Some("404450000000001"), None),
            north(),
            Some("460001234567890".into()),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(caf.status, CafStatus::PendingApproval);
        assert_eq!(caf.current_step(), 1);
        assert_eq!(caf.imsi.as_deref(), Some("404450000000001"));
        assert_eq!(caf.effective_imsi(), Some("460001234567890"));
        assert!(!caf.is_agent);
        assert_eq!(record.from, None);
        assert_eq!(record.to, CafStatus::PendingApproval);
    }

    #[test]
    fn test_ingest_usim_without_permanent_imsi_fails() {
        let err = Caf::ingest(validated("USIM001", None, None), north(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CafError::MissingPermanentImsi(_)));
    }

    #[test]
    fn test_ingest_non_usim_ignores_permanent_imsi() {
        let (caf, _) = Caf::ingest(
            validated("POSTPAID-1", Some("404451111111111"), Some("HR001")),
            north(),
            Some("460009999999999".into()),
            Utc::now(),
        )
        .unwrap();
        assert!(caf.permanent_imsi.is_none());
        assert_eq!(caf.effective_imsi(), Some("404451111111111"));
        assert!(caf.is_agent);
    }

    #[test]
    fn test_transition_updates_status_and_records_audit() {
        let (mut caf, _) = Caf::ingest(
            validated("USIM001", None, None),
            north(),
            Some("460001234567890".into()),
            Utc::now(),
        )
        .unwrap();

        let record = caf
            .transition(&Trigger::CscDecision { approved: true }, Utc::now())
            .unwrap();
        assert_eq!(caf.status, CafStatus::Approved);
        assert_eq!(record.from, Some(CafStatus::PendingApproval));
        assert_eq!(record.trigger, "CSC_APPROVED");
    }

    #[test]
    fn test_illegal_transition_leaves_caf_untouched() {
        let (mut caf, _) = Caf::ingest(
            validated("USIM001", None, None),
            north(),
            Some("460001234567890".into()),
            Utc::now(),
        )
        .unwrap();
        let before = caf.clone();

        let result = caf.transition(
            &Trigger::Ack {
                target: Target::PreAct,
                status: AckStatus::Success,
            },
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(caf, before);
    }
}
