//! Inbound CAF submission schema and boundary validation.

use std::collections::BTreeSet;

use common::{CafRefNo, IdentifierError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plan codes shipped as the default USIM set.
pub const DEFAULT_USIM_PLANS: [&str; 3] = ["USIM001", "USIM002", "USIM003"];

/// Width of `caf.plan_code`.
pub const MAX_PLAN_CODE_LEN: usize = 64;

/// Width of `caf.pos_agent_hrno` and `caf.csc_hrno`.
pub const MAX_HRNO_LEN: usize = 32;

/// Width of `caf_transition.actor`.
pub const MAX_ACTOR_LEN: usize = 64;

/// Reasons a submission is rejected before any CAF is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Malformed submission: {0}")]
    Malformed(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Invalid IMSI {0:?}: expected 5 to 15 digits")]
    InvalidImsi(String),

    #[error("Plan {plan_code} is not a USIM plan and no IMSI was supplied")]
    MissingImsi { plan_code: String },

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Rejects values wider than their column.
pub fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Customer details carried with a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Customer {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Raw submission as delivered by the message queue or the intake endpoint.
///
/// Unknown fields are rejected; required fields are checked by [`Submission::validate`]
/// so callers get a [`ValidationError`] instead of a decoder message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Submission {
    pub caf_ref_no: Option<String>,
    pub plan_code: Option<String>,
    pub imsi: Option<String>,
    pub pos_agent_hrno: Option<String>,
    pub csc_hrno: Option<String>,
    #[serde(default)]
    pub customer: Customer,
}

/// Submission that passed validation and USIM classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub caf_ref_no: CafRefNo,
    pub plan_code: String,
    pub is_usim: bool,
    pub imsi: Option<String>,
    pub pos_agent_hrno: Option<String>,
    pub csc_hrno: Option<String>,
    pub customer: Customer,
}

impl Submission {
    /// Decodes a JSON payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Checks required fields and formats, and classifies the plan.
    pub fn validate(&self, usim_plans: &UsimPlans) -> Result<ValidatedSubmission, ValidationError> {
        let caf_ref_no = self
            .caf_ref_no
            .as_deref()
            .ok_or(ValidationError::MissingField("caf_ref_no"))?;
        let caf_ref_no = CafRefNo::parse(caf_ref_no)?;

        let plan_code = non_blank(self.plan_code.as_deref())
            .ok_or(ValidationError::MissingField("plan_code"))?;
        check_len("plan_code", &plan_code, MAX_PLAN_CODE_LEN)?;

        let pos_agent_hrno = non_blank(self.pos_agent_hrno.as_deref());
        if let Some(ref hrno) = pos_agent_hrno {
            check_len("pos_agent_hrno", hrno, MAX_HRNO_LEN)?;
        }
        let csc_hrno = non_blank(self.csc_hrno.as_deref());
        if let Some(ref hrno) = csc_hrno {
            check_len("csc_hrno", hrno, MAX_HRNO_LEN)?;
        }

        let imsi = non_blank(self.imsi.as_deref());
        if let Some(ref imsi) = imsi {
            let valid_len = (5..=15).contains(&imsi.len());
            if !valid_len || !imsi.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ValidationError::InvalidImsi(imsi.clone()));
            }
        }

        let is_usim = usim_plans.contains(&plan_code);
        if !is_usim && imsi.is_none() {
            return Err(ValidationError::MissingImsi { plan_code });
        }

        Ok(ValidatedSubmission {
            caf_ref_no,
            plan_code,
            is_usim,
            imsi,
            pos_agent_hrno,
            csc_hrno,
            customer: self.customer.clone(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Configured set of plan codes that require a permanent IMSI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsimPlans(BTreeSet<String>);

impl UsimPlans {
    pub fn new<I, S>(plans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            plans
                .into_iter()
                .map(|p| p.as_ref().trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// Exact match against the configured set.
    pub fn contains(&self, plan_code: &str) -> bool {
        self.0.contains(plan_code.trim())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for UsimPlans {
    fn default() -> Self {
        Self::new(DEFAULT_USIM_PLANS)
    }
}
