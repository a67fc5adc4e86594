//! Back-office integration client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::CorrelationId;
use domain::{AckStatus, OutboxEntry, Target};

use crate::error::SagaError;

/// Calls a back-office API for a SYNC outbox entry.
///
/// `Ok` carries the target's definitive answer; `Err` means the request may
/// not have been processed and can be retried.
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    async fn invoke(&self, entry: &OutboxEntry) -> Result<AckStatus, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryIntegrationState {
    calls: Vec<(CorrelationId, Target)>,
    transport_failures: HashMap<Target, u32>,
    answers: HashMap<Target, AckStatus>,
    delay: Option<Duration>,
}

/// In-memory back-office client for testing and local runs.
///
/// Answers SUCCESS unless configured otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntegrationClient {
    state: Arc<RwLock<InMemoryIntegrationState>>,
}

impl InMemoryIntegrationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `target` fail in transport.
    pub fn set_transport_failures(&self, target: Target, count: u32) {
        if let Ok(mut state) = self.state.write() {
            state.transport_failures.insert(target, count);
        }
    }

    /// Sets the answer returned for `target`.
    pub fn set_answer(&self, target: Target, status: AckStatus) {
        if let Ok(mut state) = self.state.write() {
            state.answers.insert(target, status);
        }
    }

    /// Delays every call, e.g. to trip the caller's timeout.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut state) = self.state.write() {
            state.delay = delay;
        }
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<(CorrelationId, Target)> {
        self.state
            .read()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count_for(&self, target: Target) -> usize {
        self.state
            .read()
            .map(|s| s.calls.iter().filter(|(_, t)| *t == target).count())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IntegrationClient for InMemoryIntegrationClient {
    async fn invoke(&self, entry: &OutboxEntry) -> Result<AckStatus, SagaError> {
        let (delay, outcome) = {
            let mut state = self
                .state
                .write()
                .map_err(|_| SagaError::Transport("client state poisoned".to_string()))?;
            state
                .calls
                .push((entry.correlation_id.clone(), entry.target));

            let outcome = match state.transport_failures.get_mut(&entry.target) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    Err(SagaError::Transport(format!(
                        "{} endpoint refused connection",
                        entry.target
                    )))
                }
                _ => Ok(state
                    .answers
                    .get(&entry.target)
                    .copied()
                    .unwrap_or(AckStatus::Success)),
            };
            (state.delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{CafId, CafRefNo};
    use domain::IntegrationMode;
    use serde_json::json;

    fn entry(target: Target) -> OutboxEntry {
        OutboxEntry::pending(
            CafId::new(),
            CafRefNo::parse("CAF-1").unwrap(),
            target,
            IntegrationMode::Sync,
            json!({}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_defaults_to_success_and_logs_calls() {
        let client = InMemoryIntegrationClient::new();
        let e = entry(Target::PreAct);
        assert_eq!(client.invoke(&e).await.unwrap(), AckStatus::Success);
        assert_eq!(client.calls(), vec![(e.correlation_id.clone(), Target::PreAct)]);
    }

    #[tokio::test]
    async fn test_scripted_transport_failures_then_answer() {
        let client = InMemoryIntegrationClient::new();
        client.set_transport_failures(Target::Tv, 2);
        client.set_answer(Target::Tv, AckStatus::Failure);
        let e = entry(Target::Tv);

        assert!(client.invoke(&e).await.is_err());
        assert!(client.invoke(&e).await.is_err());
        assert_eq!(client.invoke(&e).await.unwrap(), AckStatus::Failure);
        assert_eq!(client.call_count_for(Target::Tv), 3);
        assert_eq!(client.call_count_for(Target::PreAct), 0);
    }
}
