//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::ZoneCode;
use domain::UsimPlans;
use saga::{OrchestratorConfig, RetryPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL URL; unset runs on the in-memory store
/// - `DEFAULT_ZONE` — zone for unmapped agents (default: `NORTH`)
/// - `USIM_PLANS` — comma-separated USIM plan codes
/// - `CALLBACK_BASE_URL` — base of the URL sent to external systems
/// - `SYNC_WORKERS`, `SYNC_TIMEOUT_MS` — SYNC worker pool size and call timeout
/// - `DISPATCH_MAX_ATTEMPTS`, `DISPATCH_BACKOFF_MS`, `DISPATCH_MAX_BACKOFF_MS` — retry budget
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub default_zone: ZoneCode,
    pub usim_plans: UsimPlans,
    pub callback_base_url: String,
    pub sync_workers: usize,
    pub sync_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()),
            default_zone: lookup("DEFAULT_ZONE")
                .and_then(|z| ZoneCode::parse(z).ok())
                .unwrap_or(defaults.default_zone),
            usim_plans: lookup("USIM_PLANS")
                .map(|plans| UsimPlans::new(plans.split(',')))
                .filter(|plans| !plans.is_empty())
                .unwrap_or(defaults.usim_plans),
            callback_base_url: lookup("CALLBACK_BASE_URL").unwrap_or(defaults.callback_base_url),
            sync_workers: parsed("SYNC_WORKERS")
                .map(|n| n as usize)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.sync_workers),
            sync_timeout: parsed("SYNC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sync_timeout),
            retry: RetryPolicy {
                max_attempts: parsed("DISPATCH_MAX_ATTEMPTS")
                    .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                    .unwrap_or(defaults.retry.max_attempts),
                initial_backoff: parsed("DISPATCH_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.initial_backoff),
                max_backoff: parsed("DISPATCH_MAX_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.max_backoff),
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            default_zone: self.default_zone.clone(),
            usim_plans: self.usim_plans.clone(),
            callback_base_url: self.callback_base_url.clone(),
            sync_workers: self.sync_workers,
            sync_timeout: self.sync_timeout,
            retry: self.retry,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            default_zone: orchestrator.default_zone,
            usim_plans: orchestrator.usim_plans,
            callback_base_url: orchestrator.callback_base_url,
            sync_workers: orchestrator.sync_workers,
            sync_timeout: orchestrator.sync_timeout,
            retry: orchestrator.retry,
        }
    }
}
