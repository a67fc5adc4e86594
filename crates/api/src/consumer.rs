//! Intake consumer: ingests raw submissions arriving on a channel.

use saga::IngestOutcome;
use store::OrchestrationStore;
use tokio::sync::mpsc;

use crate::routes::cafs::CafOrchestrator;

/// Buffered submissions before `POST /intake` waits for the consumer.
pub const INTAKE_CAPACITY: usize = 1024;

/// Reads JSON payloads from the intake channel until every sender is gone.
///
/// Each payload is decoded, validated, and ingested; failures are logged and
/// the loop moves on.
pub struct IntakeConsumer<S> {
    orchestrator: CafOrchestrator<S>,
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl<S: OrchestrationStore + Clone + 'static> IntakeConsumer<S> {
    pub fn new(orchestrator: CafOrchestrator<S>, receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            orchestrator,
            receiver,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("intake consumer started");
        while let Some(payload) = self.receiver.recv().await {
            match self.orchestrator.ingest_json(&payload).await {
                Ok(IngestOutcome::Created(caf)) => {
                    tracing::debug!(caf_ref_no = %caf.caf_ref_no, "intake created CAF");
                }
                Ok(IngestOutcome::Duplicate(caf)) => {
                    tracing::debug!(caf_ref_no = %caf.caf_ref_no, "intake skipped duplicate");
                }
                Err(e) if e.is_transient() => {
                    tracing::error!(error = %e, "intake failed on a transient error; submission dropped");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "intake rejected submission");
                }
            }
        }
        tracing::info!("intake channel closed, consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga::{
        InMemoryIdentityProvisioning, InMemoryIntegrationClient, Orchestrator, OrchestratorConfig,
    };
    use store::InMemoryStore;

    #[tokio::test]
    async fn test_consumer_ingests_valid_and_skips_bad_payloads() {
        let store = InMemoryStore::with_demo_zones();
        let orchestrator = Orchestrator::new(
            store.clone(),
            InMemoryIdentityProvisioning::new(),
            InMemoryIntegrationClient::new(),
            OrchestratorConfig::default(),
        );
        let (sender, receiver) = mpsc::channel(INTAKE_CAPACITY);
        let consumer = IntakeConsumer::new(orchestrator, receiver);

        let valid = br#"{"caf_ref_no":"CAF-Q1","plan_code":"USIM001"}"#;
        sender.send(b"not json".to_vec()).await.unwrap();
        sender.send(valid.to_vec()).await.unwrap();
        sender.send(br#"{"plan_code":"USIM001"}"#.to_vec()).await.unwrap();
        sender.send(valid.to_vec()).await.unwrap();
        drop(sender);

        consumer.run().await;
        assert_eq!(store.caf_count().await, 1);
    }
}
