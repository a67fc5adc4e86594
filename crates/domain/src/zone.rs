//! Integration targets, modes, and per-zone routing configuration.

use std::str::FromStr;

use common::ZoneCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caf::CafStatus;

/// Error parsing a target or mode name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("Unknown integration target: {0}")]
    UnknownTarget(String),

    #[error("Unknown integration mode: {0}")]
    UnknownMode(String),
}

/// External back-office system reached by one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "PREACT")]
    PreAct,
    #[serde(rename = "TV")]
    Tv,
    #[serde(rename = "FINALACT")]
    FinalAct,
    #[serde(rename = "COMMISSION")]
    Commission,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::PreAct, Target::Tv, Target::FinalAct, Target::Commission];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::PreAct => "PREACT",
            Target::Tv => "TV",
            Target::FinalAct => "FINALACT",
            Target::Commission => "COMMISSION",
        }
    }

    /// State the CAF must be in before this target can be dispatched.
    pub fn ready_status(&self) -> CafStatus {
        match self {
            Target::PreAct => CafStatus::Approved,
            Target::Tv => CafStatus::PreactDone,
            Target::FinalAct => CafStatus::TvDone,
            Target::Commission => CafStatus::FinalactDone,
        }
    }

    pub fn sent_status(&self) -> CafStatus {
        match self {
            Target::PreAct => CafStatus::PreactSent,
            Target::Tv => CafStatus::TvSent,
            Target::FinalAct => CafStatus::FinalactSent,
            Target::Commission => CafStatus::CommissionSent,
        }
    }

    pub fn done_status(&self) -> CafStatus {
        match self {
            Target::PreAct => CafStatus::PreactDone,
            Target::Tv => CafStatus::TvDone,
            Target::FinalAct => CafStatus::FinalactDone,
            Target::Commission => CafStatus::Completed,
        }
    }

    pub fn failed_status(&self) -> CafStatus {
        match self {
            Target::PreAct => CafStatus::PreactFailed,
            Target::Tv => CafStatus::TvFailed,
            Target::FinalAct => CafStatus::FinalactFailed,
            Target::Commission => CafStatus::CommissionFailed,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ZoneError::UnknownTarget(s.to_string()))
    }
}

/// How a step's integration is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationMode {
    /// Direct API call made by the orchestrator's worker pool.
    Sync,
    /// Durable record picked up by a downstream batch (DB-link) consumer.
    Async,
}

impl IntegrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationMode::Sync => "SYNC",
            IntegrationMode::Async => "ASYNC",
        }
    }
}

impl std::fmt::Display for IntegrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationMode {
    type Err = ZoneError;

    /// Accepts `SYNC`/`API` and `ASYNC`/`DBLINK`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SYNC" | "API" => Ok(IntegrationMode::Sync),
            "ASYNC" | "DBLINK" => Ok(IntegrationMode::Async),
            _ => Err(ZoneError::UnknownMode(s.to_string())),
        }
    }
}

/// Per-zone integration routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub zone_code: ZoneCode,
    pub zone_name: String,
    pub preact_mode: IntegrationMode,
    pub tv_mode: IntegrationMode,
    pub finalact_mode: IntegrationMode,
    pub commission_mode: IntegrationMode,
    pub is_active: bool,
}

impl ZoneConfig {
    /// Configuration with every target set to the same mode.
    pub fn uniform(zone_code: ZoneCode, mode: IntegrationMode) -> Self {
        Self {
            zone_name: zone_code.to_string(),
            zone_code,
            preact_mode: mode,
            tv_mode: mode,
            finalact_mode: mode,
            commission_mode: mode,
            is_active: true,
        }
    }

    pub fn mode_for(&self, target: Target) -> IntegrationMode {
        match target {
            Target::PreAct => self.preact_mode,
            Target::Tv => self.tv_mode,
            Target::FinalAct => self.finalact_mode,
            Target::Commission => self.commission_mode,
        }
    }
}

/// Assignment of a POS agent to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentZone {
    pub hrno: String,
    pub agent_name: String,
    pub zone_code: ZoneCode,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_aliases() {
        assert_eq!("api".parse::<IntegrationMode>().unwrap(), IntegrationMode::Sync);
        assert_eq!("DBLINK".parse::<IntegrationMode>().unwrap(), IntegrationMode::Async);
        assert_eq!("Sync".parse::<IntegrationMode>().unwrap(), IntegrationMode::Sync);
        assert!("ftp".parse::<IntegrationMode>().is_err());
    }

    #[test]
    fn test_target_parse_and_display() {
        for target in Target::ALL {
            assert_eq!(target.as_str().parse::<Target>().unwrap(), target);
        }
        assert_eq!("finalact".parse::<Target>().unwrap(), Target::FinalAct);
        assert_eq!(
            serde_json::to_string(&Target::PreAct).unwrap(),
            "\"PREACT\""
        );
    }

    #[test]
    fn test_status_chain_is_contiguous() {
        assert_eq!(Target::Tv.ready_status(), Target::PreAct.done_status());
        assert_eq!(Target::FinalAct.ready_status(), Target::Tv.done_status());
        assert_eq!(Target::Commission.ready_status(), Target::FinalAct.done_status());
    }

    #[test]
    fn test_mode_for() {
        let mut config = ZoneConfig::uniform(ZoneCode::parse("NORTH").unwrap(), IntegrationMode::Async);
        config.preact_mode = IntegrationMode::Sync;
        assert_eq!(config.mode_for(Target::PreAct), IntegrationMode::Sync);
        assert_eq!(config.mode_for(Target::Commission), IntegrationMode::Async);
    }
}
