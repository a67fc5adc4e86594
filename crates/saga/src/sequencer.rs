//! Step sequencer: the one place that knows the pipeline order.

use domain::{Caf, CafStatus, Target};

/// What should happen next for a CAF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Dispatch an integration request to this target.
    Dispatch(Target),
    /// Finish the case without a commission step.
    Complete,
    /// Nothing is due: waiting on a decision or an acknowledgement, or terminal.
    Idle,
}

pub fn next_action(caf: &Caf) -> NextAction {
    match caf.status {
        CafStatus::Approved => NextAction::Dispatch(Target::PreAct),
        CafStatus::PreactDone => NextAction::Dispatch(Target::Tv),
        CafStatus::TvDone => NextAction::Dispatch(Target::FinalAct),
        CafStatus::FinalactDone if caf.is_agent => NextAction::Dispatch(Target::Commission),
        CafStatus::FinalactDone => NextAction::Complete,
        _ => NextAction::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::ZoneCode;
    use domain::{Submission, UsimPlans};

    fn caf(agent: Option<&str>, status: CafStatus) -> Caf {
        let validated = Submission {
            caf_ref_no: Some("CAF-S".into()),
            plan_code: Some("PREPAID-1".into()),
            imsi: Some("404450000000001".into()),
            pos_agent_hrno: agent.map(String::from),
            ..Default::default()
        }
        .validate(&UsimPlans::default())
        .unwrap();
        let (mut caf, _) =
            Caf::ingest(validated, ZoneCode::parse("NORTH").unwrap(), None, Utc::now()).unwrap();
        caf.status = status;
        caf
    }

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            next_action(&caf(None, CafStatus::Approved)),
            NextAction::Dispatch(Target::PreAct)
        );
        assert_eq!(
            next_action(&caf(None, CafStatus::PreactDone)),
            NextAction::Dispatch(Target::Tv)
        );
        assert_eq!(
            next_action(&caf(None, CafStatus::TvDone)),
            NextAction::Dispatch(Target::FinalAct)
        );
    }

    #[test]
    fn test_commission_branch() {
        assert_eq!(
            next_action(&caf(Some("HR001"), CafStatus::FinalactDone)),
            NextAction::Dispatch(Target::Commission)
        );
        assert_eq!(
            next_action(&caf(None, CafStatus::FinalactDone)),
            NextAction::Complete
        );
    }

    #[test]
    fn test_idle_states() {
        for status in CafStatus::ALL {
            let action = next_action(&caf(Some("HR001"), status));
            let due = matches!(
                status,
                CafStatus::Approved
                    | CafStatus::PreactDone
                    | CafStatus::TvDone
                    | CafStatus::FinalactDone
            );
            assert_eq!(action != NextAction::Idle, due, "{status}");
        }
    }
}
