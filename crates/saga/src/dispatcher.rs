//! Integration dispatcher: builds requests and records them in the outbox.

use chrono::Utc;
use common::CorrelationId;
use domain::{Caf, OutboxEntry, Target, Trigger};
use serde_json::{Map, Value, json};
use store::{OrchestrationStore, StoreError};

use crate::error::{Result, SagaError};
use crate::retry::RetryPolicy;
use crate::zone::ZoneResolver;

/// Builds the request body sent to `target` for this CAF.
pub fn build_payload(
    caf: &Caf,
    target: Target,
    correlation_id: &CorrelationId,
    callback_base_url: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("caf_ref_no".into(), json!(caf.caf_ref_no.as_str()));
    payload.insert("correlation_id".into(), json!(correlation_id.as_str()));
    payload.insert(
        "callback_url".into(),
        json!(callback_url(callback_base_url, correlation_id)),
    );

    match target {
        Target::PreAct => {
            payload.insert("imsi".into(), json!(caf.effective_imsi()));
            payload.insert("zone_code".into(), json!(caf.zone_code.as_str()));
        }
        Target::Tv => {
            payload.insert("zone_code".into(), json!(caf.zone_code.as_str()));
        }
        Target::FinalAct => {
            payload.insert("imsi".into(), json!(caf.effective_imsi()));
        }
        Target::Commission => {
            payload.insert("agent_hrno".into(), json!(caf.pos_agent_hrno));
            payload.insert("zone_code".into(), json!(caf.zone_code.as_str()));
        }
    }

    Value::Object(payload)
}

pub fn callback_url(callback_base_url: &str, correlation_id: &CorrelationId) -> String {
    format!(
        "{}/callbacks/{}",
        callback_base_url.trim_end_matches('/'),
        correlation_id
    )
}

/// Records dispatches: one PENDING outbox entry plus the CAF's "sent"
/// transition, written as one unit.
#[derive(Clone)]
pub struct Dispatcher<S> {
    store: S,
    resolver: ZoneResolver<S>,
    retry: RetryPolicy,
    callback_base_url: String,
}

impl<S: OrchestrationStore> Dispatcher<S> {
    pub fn new(
        store: S,
        resolver: ZoneResolver<S>,
        retry: RetryPolicy,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            retry,
            callback_base_url: callback_base_url.into(),
        }
    }

    /// Dispatches `target` for the CAF and updates `caf` to its "sent" state.
    ///
    /// The caller must hold the CAF's lock. Storage failures are retried with
    /// backoff; if every attempt fails nothing was written and `caf` is unchanged.
    #[tracing::instrument(skip(self, caf), fields(caf_ref_no = %caf.caf_ref_no, target = %target))]
    pub async fn dispatch(&self, caf: &mut Caf, target: Target) -> Result<OutboxEntry> {
        let mode = self.resolver.resolve_mode(&caf.zone_code, target).await.value;
        let expected = caf.status;
        let now = Utc::now();

        let mut sent = caf.clone();
        let record = sent
            .transition(&Trigger::Dispatched(target), now)
            .map_err(|e| SagaError::from_transition(&caf.caf_ref_no, expected, e))?;

        let mut entry = OutboxEntry::pending(
            caf.id,
            caf.caf_ref_no.clone(),
            target,
            mode,
            Value::Null,
            now,
        );
        entry.payload = build_payload(&sent, target, &entry.correlation_id, &self.callback_base_url);
        let record = record
            .with_correlation_id(entry.correlation_id.clone())
            .with_detail(format!("mode={mode}"));

        let entry = self
            .retry
            .run(
                |attempt| {
                    let mut entry = entry.clone();
                    entry.attempts = attempt;
                    let record = record.clone();
                    let sent = &sent;
                    async move {
                        self.store
                            .create_dispatch(sent, expected, record, entry.clone())
                            .await
                            .map(|()| entry)
                    }
                },
                StoreError::is_transient,
            )
            .await
            .map_err(|e| match e {
                StoreError::StaleStatus { actual, .. } => SagaError::StateConflict {
                    caf_ref_no: caf.caf_ref_no.clone(),
                    status: actual,
                    reason: format!("{target} dispatch expected {expected}"),
                },
                StoreError::OpenOutboxExists { .. } => SagaError::StateConflict {
                    caf_ref_no: caf.caf_ref_no.clone(),
                    status: expected,
                    reason: format!("an open {target} request already exists"),
                },
                other => SagaError::Store(other),
            })?;

        *caf = sent;
        metrics::counter!(
            "outbox_dispatched_total",
            "target" => target.as_str(),
            "mode" => mode.as_str()
        )
        .increment(1);
        tracing::info!(
            correlation_id = %entry.correlation_id,
            mode = %mode,
            attempts = entry.attempts,
            "integration request recorded"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ZoneCode;
    use domain::{CafStatus, IntegrationMode, OutboxStatus, Submission, UsimPlans};
    use store::{CafRepository, InMemoryStore, OutboxRepository};

    async fn approved_caf(store: &InMemoryStore, agent: Option<&str>) -> Caf {
        let validated = Submission {
            caf_ref_no: Some("CAF-D1".into()),
            plan_code: Some("USIM001".into()),
            imsi: Some("404450000000009".into()),
            pos_agent_hrno: agent.map(String::from),
            ..Default::default()
        }
        .validate(&UsimPlans::default())
        .unwrap();
        let (mut caf, record) = Caf::ingest(
            validated,
            ZoneCode::parse("NORTH").unwrap(),
            Some("460001111111111".into()),
            Utc::now(),
        )
        .unwrap();
        store.create_if_absent(caf.clone(), record).await.unwrap();
        let record = caf
            .transition(&Trigger::CscDecision { approved: true }, Utc::now())
            .unwrap();
        store
            .update_status(&caf, CafStatus::PendingApproval, record)
            .await
            .unwrap();
        caf
    }

    fn dispatcher(store: &InMemoryStore, retry: RetryPolicy) -> Dispatcher<InMemoryStore> {
        let resolver = ZoneResolver::new(store.clone(), ZoneCode::parse("NORTH").unwrap());
        Dispatcher::new(store.clone(), resolver, retry, "http://orchestrator:3000/")
    }

    #[test]
    fn test_payload_shapes() {
        let validated = Submission {
            caf_ref_no: Some("CAF-P".into()),
            plan_code: Some("USIM001".into()),
            pos_agent_hrno: Some("HR001".into()),
            ..Default::default()
        }
        .validate(&UsimPlans::default())
        .unwrap();
        let (caf, _) = Caf::ingest(
            validated,
            ZoneCode::parse("NORTH").unwrap(),
            Some("460001234567890".into()),
            Utc::now(),
        )
        .unwrap();
        let corr = CorrelationId::new("PREACT-CAF-P-abc");

        let preact = build_payload(&caf, Target::PreAct, &corr, "http://h:1/");
        assert_eq!(preact["imsi"], "460001234567890");
        assert_eq!(preact["zone_code"], "NORTH");
        assert_eq!(preact["callback_url"], "http://h:1/callbacks/PREACT-CAF-P-abc");

        let tv = build_payload(&caf, Target::Tv, &corr, "http://h:1");
        assert!(tv.get("imsi").is_none());
        assert_eq!(tv["caf_ref_no"], "CAF-P");

        let finalact = build_payload(&caf, Target::FinalAct, &corr, "http://h:1");
        assert!(finalact.get("zone_code").is_none());
        assert_eq!(finalact["imsi"], "460001234567890");

        let commission = build_payload(&caf, Target::Commission, &corr, "http://h:1");
        assert_eq!(commission["agent_hrno"], "HR001");
        assert_eq!(commission["correlation_id"], "PREACT-CAF-P-abc");
    }

    #[tokio::test]
    async fn test_dispatch_records_entry_and_sent_state() {
        let store = InMemoryStore::with_demo_zones();
        let mut caf = approved_caf(&store, None).await;

        let entry = dispatcher(&store, RetryPolicy::immediate(3))
            .dispatch(&mut caf, Target::PreAct)
            .await
            .unwrap();

        assert_eq!(caf.status, CafStatus::PreactSent);
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.mode, IntegrationMode::Sync);
        assert_eq!(entry.attempts, 1);
        let stored = store.get_caf(&caf.caf_ref_no).await.unwrap().unwrap();
        assert_eq!(stored.status, CafStatus::PreactSent);
        assert_eq!(store.list_outbox(&caf.caf_ref_no).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_retried() {
        let store = InMemoryStore::with_demo_zones();
        let mut caf = approved_caf(&store, None).await;
        store.fail_next_writes(2);

        let entry = dispatcher(&store, RetryPolicy::immediate(3))
            .dispatch(&mut caf, Target::PreAct)
            .await
            .unwrap();
        assert_eq!(entry.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_write_leaves_nothing_behind() {
        let store = InMemoryStore::with_demo_zones();
        let mut caf = approved_caf(&store, None).await;
        store.fail_next_writes(5);

        let err = dispatcher(&store, RetryPolicy::immediate(2))
            .dispatch(&mut caf, Target::PreAct)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(caf.status, CafStatus::Approved);
        assert_eq!(store.outbox_count().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_state_is_conflict() {
        let store = InMemoryStore::with_demo_zones();
        let mut caf = approved_caf(&store, None).await;

        let err = dispatcher(&store, RetryPolicy::immediate(1))
            .dispatch(&mut caf, Target::Tv)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_commission_mode_follows_zone() {
        let store = InMemoryStore::with_demo_zones();
        let mut caf = approved_caf(&store, Some("HR001")).await;
        // Skip ahead to FINALACT_DONE without going through the store.
        caf.status = CafStatus::FinalactDone;
        store
            .update_status(
                &caf,
                CafStatus::Approved,
                caf.clone()
                    .transition(&Trigger::CommissionSkipped, Utc::now())
                    .unwrap(),
            )
            .await
            .unwrap();

        let entry = dispatcher(&store, RetryPolicy::immediate(1))
            .dispatch(&mut caf, Target::Commission)
            .await
            .unwrap();
        assert_eq!(entry.mode, IntegrationMode::Async);
        assert_eq!(entry.payload["agent_hrno"], "HR001");
        assert_eq!(caf.status, CafStatus::CommissionSent);
    }
}
