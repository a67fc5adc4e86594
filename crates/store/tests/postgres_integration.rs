//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CafRefNo, ZoneCode};
use domain::{
    AckStatus, Caf, CafStatus, IntegrationMode, MAX_ACTOR_LEN, MAX_HRNO_LEN, MAX_PLAN_CODE_LEN,
    OutboxEntry, OutboxStatus, Submission, Target, Trigger, UsimPlans, ValidationError,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    CafRepository, CreateOutcome, OrchestrationStore, OutboxRepository, PostgresStore, StoreError,
    ZoneRepository,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared case tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE caf_transition, integration_outbox, caf")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn new_caf(ref_no: &str, plan: &str, agent: Option<&str>) -> (Caf, domain::TransitionRecord) {
    let validated = Submission {
        caf_ref_no: Some(ref_no.into()),
        plan_code: Some(plan.into()),
        imsi: Some("404451234567890".into()),
        pos_agent_hrno: agent.map(String::from),
        ..Default::default()
    }
    .validate(&UsimPlans::default())
    .unwrap();
    let permanent = validated.is_usim.then(|| "460001234567890".to_string());
    Caf::ingest(validated, ZoneCode::parse("NORTH").unwrap(), permanent, Utc::now()).unwrap()
}

async fn create_approved(store: &PostgresStore, ref_no: &str) -> Caf {
    let (mut caf, record) = new_caf(ref_no, "USIM001", Some("HR001"));
    store.create_if_absent(caf.clone(), record).await.unwrap();
    let record = caf
        .transition(&Trigger::CscDecision { approved: true }, Utc::now())
        .unwrap()
        .with_actor("CSC-1");
    store
        .update_status(&caf, CafStatus::PendingApproval, record)
        .await
        .unwrap();
    caf
}

async fn dispatch_preact(store: &PostgresStore, caf: &mut Caf) -> OutboxEntry {
    let entry = OutboxEntry::pending(
        caf.id,
        caf.caf_ref_no.clone(),
        Target::PreAct,
        IntegrationMode::Sync,
        json!({"caf_ref_no": caf.caf_ref_no.as_str()}),
        Utc::now(),
    );
    let record = caf
        .transition(&Trigger::Dispatched(Target::PreAct), Utc::now())
        .unwrap()
        .with_correlation_id(entry.correlation_id.clone());
    store
        .create_dispatch(caf, CafStatus::Approved, record, entry.clone())
        .await
        .unwrap();
    entry
}

#[tokio::test]
#[serial]
async fn create_and_load_caf() {
    let store = get_test_store().await;
    let (caf, record) = new_caf("CAF-PG-1", "USIM001", None);

    let outcome = store.create_if_absent(caf.clone(), record).await.unwrap();
    assert!(matches!(outcome, CreateOutcome::Created(_)));

    let loaded = store.get_caf(&caf.caf_ref_no).await.unwrap().unwrap();
    assert_eq!(loaded.id, caf.id);
    assert_eq!(loaded.status, CafStatus::PendingApproval);
    assert_eq!(loaded.permanent_imsi.as_deref(), Some("460001234567890"));
    assert!(loaded.is_usim);
    assert!(!loaded.is_agent);
}

#[tokio::test]
#[serial]
async fn duplicate_ingestion_returns_existing() {
    let store = get_test_store().await;
    let (caf, record) = new_caf("CAF-PG-2", "PREPAID-1", Some("HR002"));
    store.create_if_absent(caf.clone(), record).await.unwrap();

    let (again, record) = new_caf("CAF-PG-2", "PREPAID-1", Some("HR002"));
    let outcome = store.create_if_absent(again, record).await.unwrap();
    assert!(matches!(outcome, CreateOutcome::Existing(_)));
    assert_eq!(outcome.caf().id, caf.id);

    let history = store.transitions(&caf.caf_ref_no).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[serial]
async fn conditional_update_detects_stale_status() {
    let store = get_test_store().await;
    let caf = create_approved(&store, "CAF-PG-3").await;

    let mut rejected = caf.clone();
    rejected.status = CafStatus::Rejected;
    let record = domain::TransitionRecord {
        from: Some(CafStatus::PendingApproval),
        to: CafStatus::Rejected,
        ..store.transitions(&caf.caf_ref_no).await.unwrap()[0].clone()
    };
    let err = store
        .update_status(&rejected, CafStatus::PendingApproval, record)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::StaleStatus {
            actual: CafStatus::Approved,
            ..
        }
    ));

    let history = store.transitions(&caf.caf_ref_no).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].actor.as_deref(), Some("CSC-1"));
}

#[tokio::test]
#[serial]
async fn dispatch_and_resolve_outbox() {
    let store = get_test_store().await;
    let mut caf = create_approved(&store, "CAF-PG-4").await;
    let entry = dispatch_preact(&store, &mut caf).await;

    let stored = store.get_outbox(&entry.correlation_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.mode, IntegrationMode::Sync);
    assert_eq!(stored.target, Target::PreAct);

    let attempted = store
        .record_attempt(&entry.correlation_id, Some("connection reset".into()))
        .await
        .unwrap();
    assert_eq!(attempted.attempts, 1);
    assert_eq!(attempted.last_error.as_deref(), Some("connection reset"));

    let record = caf
        .transition(
            &Trigger::Ack {
                target: Target::PreAct,
                status: AckStatus::Success,
            },
            Utc::now(),
        )
        .unwrap();
    let resolved = store
        .resolve_outbox(
            &entry.correlation_id,
            OutboxStatus::Acked,
            None,
            &caf,
            CafStatus::PreactSent,
            record.clone(),
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, OutboxStatus::Acked);

    let err = store
        .resolve_outbox(
            &entry.correlation_id,
            OutboxStatus::Acked,
            None,
            &caf,
            CafStatus::PreactSent,
            record,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OutboxNotPending { .. }));

    let loaded = store.get_caf(&caf.caf_ref_no).await.unwrap().unwrap();
    assert_eq!(loaded.status, CafStatus::PreactDone);
    assert_eq!(loaded.current_step(), 4);
}

#[tokio::test]
#[serial]
async fn open_entry_index_blocks_second_dispatch() {
    let store = get_test_store().await;
    let mut caf = create_approved(&store, "CAF-PG-5").await;
    dispatch_preact(&store, &mut caf).await;

    // Pretend the CAF went back to APPROVED so only the index can reject the insert.
    sqlx::query("UPDATE caf SET status = 'APPROVED' WHERE caf_ref_no = $1")
        .bind(caf.caf_ref_no.as_str())
        .execute(store.pool())
        .await
        .unwrap();
    caf.status = CafStatus::Approved;

    let entry = OutboxEntry::pending(
        caf.id,
        caf.caf_ref_no.clone(),
        Target::PreAct,
        IntegrationMode::Sync,
        json!({}),
        Utc::now(),
    );
    let record = caf
        .transition(&Trigger::Dispatched(Target::PreAct), Utc::now())
        .unwrap();
    let err = store
        .create_dispatch(&caf, CafStatus::Approved, record, entry)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OpenOutboxExists { .. }));

    let entries = store.list_outbox(&caf.caf_ref_no).await.unwrap();
    assert_eq!(entries.len(), 1);
    let loaded = store.get_caf(&caf.caf_ref_no).await.unwrap().unwrap();
    assert_eq!(loaded.status, CafStatus::Approved);
}

#[tokio::test]
#[serial]
async fn seeded_zones_and_agents() {
    let store = get_test_store().await;

    let north = store
        .zone_config(&ZoneCode::parse("NORTH").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(north.preact_mode, IntegrationMode::Sync);
    assert_eq!(north.tv_mode, IntegrationMode::Async);

    let agent = store.agent_zone("HR004").await.unwrap().unwrap();
    assert_eq!(agent.zone_code.as_str(), "WEST");
    assert!(store.zone_config(&agent.zone_code).await.unwrap().is_none());
    assert!(store.agent_zone("HR999").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn unknown_caf_is_none() {
    let store = get_test_store().await;
    let missing = CafRefNo::parse("CAF-NOPE").unwrap();
    assert!(store.get_caf(&missing).await.unwrap().is_none());
    assert!(store.list_outbox(&missing).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn validated_fields_fit_their_columns() {
    let store = get_test_store().await;
    let widest = Submission {
        caf_ref_no: Some("C".repeat(common::MAX_CAF_REF_NO_LEN)),
        plan_code: Some("P".repeat(MAX_PLAN_CODE_LEN)),
        imsi: Some("404451234567890".into()),
        pos_agent_hrno: Some("H".repeat(MAX_HRNO_LEN)),
        csc_hrno: Some("S".repeat(MAX_HRNO_LEN)),
        ..Default::default()
    };

    let validated = widest.validate(&UsimPlans::default()).unwrap();
    let (mut caf, record) =
        Caf::ingest(validated, ZoneCode::parse("NORTH").unwrap(), None, Utc::now()).unwrap();
    store.create_if_absent(caf.clone(), record).await.unwrap();

    let record = caf
        .transition(&Trigger::CscDecision { approved: true }, Utc::now())
        .unwrap()
        .with_actor("A".repeat(MAX_ACTOR_LEN));
    store
        .update_status(&caf, CafStatus::PendingApproval, record)
        .await
        .unwrap();

    let loaded = store.get_caf(&caf.caf_ref_no).await.unwrap().unwrap();
    assert_eq!(loaded.plan_code.len(), MAX_PLAN_CODE_LEN);
    assert_eq!(loaded.pos_agent_hrno.map(|h| h.len()), Some(MAX_HRNO_LEN));

    let mut over = widest.clone();
    over.caf_ref_no = Some("CAF-PG-WIDE".into());
    over.csc_hrno = Some("S".repeat(MAX_HRNO_LEN + 1));
    assert!(matches!(
        over.validate(&UsimPlans::default()),
        Err(ValidationError::TooLong { field: "csc_hrno", .. })
    ));
}

#[tokio::test]
#[serial]
async fn pending_entries_listed_by_mode() {
    let store = get_test_store().await;
    let mut caf = create_approved(&store, "CAF-PG-9").await;
    let entry = dispatch_preact(&store, &mut caf).await;

    let pending = store.list_pending(IntegrationMode::Sync).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].correlation_id, entry.correlation_id);
    assert!(store.list_pending(IntegrationMode::Async).await.unwrap().is_empty());
}
