use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{CafRefNo, CorrelationId, ZoneCode};
use domain::{
    AgentZone, Caf, CafStatus, IntegrationMode, OutboxEntry, OutboxStatus, TransitionRecord,
    ZoneConfig,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    repository::{CafRepository, CreateOutcome, OrchestrationStore, OutboxRepository, ZoneRepository},
};

/// Demo routing: NORTH runs PREACT/FINALACT over the API, SOUTH the inverse.
/// Agents HR003 and HR004 point at zones without configuration.
const DEMO_ZONES: [(&str, &str, [IntegrationMode; 4]); 2] = [
    (
        "NORTH",
        "North Circle",
        [
            IntegrationMode::Sync,
            IntegrationMode::Async,
            IntegrationMode::Sync,
            IntegrationMode::Async,
        ],
    ),
    (
        "SOUTH",
        "South Circle",
        [
            IntegrationMode::Async,
            IntegrationMode::Sync,
            IntegrationMode::Async,
            IntegrationMode::Sync,
        ],
    ),
];

const DEMO_AGENTS: [(&str, &str, &str); 4] = [
    ("HR001", "Agent North", "NORTH"),
    ("HR002", "Agent South", "SOUTH"),
    ("HR003", "Agent East", "EAST"),
    ("HR004", "Agent West", "WEST"),
];

#[derive(Default)]
struct State {
    cafs: HashMap<CafRefNo, Caf>,
    transitions: Vec<TransitionRecord>,
    outbox: Vec<OutboxEntry>,
    zones: HashMap<ZoneCode, ZoneConfig>,
    agents: HashMap<String, AgentZone>,
}

impl State {
    fn check_status(&self, caf_ref_no: &CafRefNo, expected: CafStatus) -> Result<()> {
        let stored = self
            .cafs
            .get(caf_ref_no)
            .ok_or_else(|| StoreError::CafNotFound(caf_ref_no.clone()))?;
        if stored.status != expected {
            return Err(StoreError::StaleStatus {
                caf_ref_no: caf_ref_no.clone(),
                expected,
                actual: stored.status,
            });
        }
        Ok(())
    }

    fn outbox_mut(&mut self, correlation_id: &CorrelationId) -> Result<&mut OutboxEntry> {
        self.outbox
            .iter_mut()
            .find(|e| &e.correlation_id == correlation_id)
            .ok_or_else(|| StoreError::OutboxNotFound(correlation_id.clone()))
    }
}

/// In-memory store implementation.
///
/// Every atomic unit runs under one write lock, so it provides the same
/// all-or-nothing behavior as the PostgreSQL transactions.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    failing_writes: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the demo zones and agents.
    pub fn with_demo_zones() -> Self {
        let mut state = State::default();
        for (code, name, modes) in DEMO_ZONES {
            if let Ok(zone_code) = ZoneCode::parse(code) {
                let [preact_mode, tv_mode, finalact_mode, commission_mode] = modes;
                state.zones.insert(
                    zone_code.clone(),
                    ZoneConfig {
                        zone_code,
                        zone_name: name.to_string(),
                        preact_mode,
                        tv_mode,
                        finalact_mode,
                        commission_mode,
                        is_active: true,
                    },
                );
            }
        }
        for (hrno, agent_name, zone) in DEMO_AGENTS {
            if let Ok(zone_code) = ZoneCode::parse(zone) {
                state.agents.insert(
                    hrno.to_string(),
                    AgentZone {
                        hrno: hrno.to_string(),
                        agent_name: agent_name.to_string(),
                        zone_code,
                        is_active: true,
                    },
                );
            }
        }
        Self {
            state: Arc::new(RwLock::new(state)),
            failing_writes: Arc::default(),
        }
    }

    pub async fn put_zone_config(&self, config: ZoneConfig) {
        self.state
            .write()
            .await
            .zones
            .insert(config.zone_code.clone(), config);
    }

    pub async fn remove_zone_config(&self, zone_code: &ZoneCode) {
        self.state.write().await.zones.remove(zone_code);
    }

    pub async fn put_agent(&self, agent: AgentZone) {
        self.state
            .write()
            .await
            .agents
            .insert(agent.hrno.clone(), agent);
    }

    /// Makes the next `count` writes fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub async fn caf_count(&self) -> usize {
        self.state.read().await.cafs.len()
    }

    pub async fn outbox_count(&self) -> usize {
        self.state.read().await.outbox.len()
    }

    fn check_available(&self) -> Result<()> {
        let tripped = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CafRepository for InMemoryStore {
    async fn create_if_absent(&self, caf: Caf, record: TransitionRecord) -> Result<CreateOutcome> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.cafs.get(&caf.caf_ref_no) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        state.cafs.insert(caf.caf_ref_no.clone(), caf.clone());
        state.transitions.push(record);
        Ok(CreateOutcome::Created(caf))
    }

    async fn get_caf(&self, caf_ref_no: &CafRefNo) -> Result<Option<Caf>> {
        Ok(self.state.read().await.cafs.get(caf_ref_no).cloned())
    }

    async fn update_status(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.check_status(&caf.caf_ref_no, expected)?;

        state.cafs.insert(caf.caf_ref_no.clone(), caf.clone());
        state.transitions.push(record);
        Ok(())
    }

    async fn transitions(&self, caf_ref_no: &CafRefNo) -> Result<Vec<TransitionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .transitions
            .iter()
            .filter(|r| &r.caf_ref_no == caf_ref_no)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryStore {
    async fn get_outbox(&self, correlation_id: &CorrelationId) -> Result<Option<OutboxEntry>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .find(|e| &e.correlation_id == correlation_id)
            .cloned())
    }

    async fn list_outbox(&self, caf_ref_no: &CafRefNo) -> Result<Vec<OutboxEntry>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| &e.caf_ref_no == caf_ref_no)
            .cloned()
            .collect())
    }

    async fn list_pending(&self, mode: IntegrationMode) -> Result<Vec<OutboxEntry>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.mode == mode && e.is_pending())
            .cloned()
            .collect())
    }

    async fn record_attempt(
        &self,
        correlation_id: &CorrelationId,
        error: Option<String>,
    ) -> Result<OutboxEntry> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let entry = state.outbox_mut(correlation_id)?;
        if !entry.is_pending() {
            return Err(StoreError::OutboxNotPending {
                correlation_id: correlation_id.clone(),
                status: entry.status,
            });
        }

        entry.attempts += 1;
        if error.is_some() {
            entry.last_error = error;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[async_trait]
impl ZoneRepository for InMemoryStore {
    async fn zone_config(&self, zone_code: &ZoneCode) -> Result<Option<ZoneConfig>> {
        Ok(self.state.read().await.zones.get(zone_code).cloned())
    }

    async fn agent_zone(&self, hrno: &str) -> Result<Option<AgentZone>> {
        Ok(self.state.read().await.agents.get(hrno).cloned())
    }
}

#[async_trait]
impl OrchestrationStore for InMemoryStore {
    async fn create_dispatch(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
        entry: OutboxEntry,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.check_status(&caf.caf_ref_no, expected)?;

        if state
            .outbox
            .iter()
            .any(|e| e.correlation_id == entry.correlation_id)
        {
            return Err(StoreError::DuplicateCorrelation(entry.correlation_id));
        }
        if state
            .outbox
            .iter()
            .any(|e| e.caf_id == entry.caf_id && e.target == entry.target && e.is_pending())
        {
            return Err(StoreError::OpenOutboxExists {
                caf_ref_no: entry.caf_ref_no,
                target: entry.target,
            });
        }

        state.cafs.insert(caf.caf_ref_no.clone(), caf.clone());
        state.outbox.push(entry);
        state.transitions.push(record);
        Ok(())
    }

    async fn resolve_outbox(
        &self,
        correlation_id: &CorrelationId,
        status: OutboxStatus,
        last_error: Option<String>,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<OutboxEntry> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let current = state.outbox_mut(correlation_id)?.status;
        if !current.is_pending() {
            return Err(StoreError::OutboxNotPending {
                correlation_id: correlation_id.clone(),
                status: current,
            });
        }
        state.check_status(&caf.caf_ref_no, expected)?;

        let entry = state.outbox_mut(correlation_id)?;
        entry.status = status;
        if last_error.is_some() {
            entry.last_error = last_error;
        }
        entry.updated_at = record.occurred_at;
        let resolved = entry.clone();

        state.cafs.insert(caf.caf_ref_no.clone(), caf.clone());
        state.transitions.push(record);
        Ok(resolved)
    }
}
