//! Orchestrator for the CAF activation saga.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{CafRefNo, CorrelationId, ZoneCode};
use domain::{
    AckStatus, Caf, CafStatus, DomainError, IntegrationMode, MAX_ACTOR_LEN, OutboxEntry,
    Submission, TransitionRecord, Trigger, UsimPlans, check_len,
};
use serde::Serialize;
use store::{CreateOutcome, OrchestrationStore, StoreError};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, SagaError};
use crate::locks::CafLocks;
use crate::retry::RetryPolicy;
use crate::sequencer::{self, NextAction};
use crate::services::{IdentityProvisioning, IntegrationClient};
use crate::tracker::{AckOutcome, CallbackProcessor};
use crate::worker::{SyncJob, SyncJobHandler, SyncWorkerPool};
use crate::zone::ZoneResolver;

/// Runtime settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_zone: ZoneCode,
    pub usim_plans: UsimPlans,
    /// Base URL external systems call back on; `/callbacks/<id>` is appended.
    pub callback_base_url: String,
    pub sync_workers: usize,
    pub sync_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_zone: ZoneCode::default_zone(),
            usim_plans: UsimPlans::default(),
            callback_base_url: "http://localhost:3000".to_string(),
            sync_workers: 8,
            sync_timeout: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of ingesting a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Created(Caf),
    /// The reference number was already known; the stored CAF is returned.
    Duplicate(Caf),
}

impl IngestOutcome {
    pub fn caf(&self) -> &Caf {
        match self {
            IngestOutcome::Created(caf) | IngestOutcome::Duplicate(caf) => caf,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate(_))
    }
}

/// Result of running the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Dispatched(OutboxEntry),
    Completed,
    Idle,
}

/// Status view of one CAF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CafSummary {
    pub caf_ref_no: CafRefNo,
    pub status: CafStatus,
    pub current_step: u8,
}

impl From<&Caf> for CafSummary {
    fn from(caf: &Caf) -> Self {
        Self {
            caf_ref_no: caf.caf_ref_no.clone(),
            status: caf.status,
            current_step: caf.current_step(),
        }
    }
}

struct Inner<S, P, C> {
    store: S,
    identity: P,
    client: C,
    resolver: ZoneResolver<S>,
    dispatcher: Dispatcher<S>,
    tracker: CallbackProcessor<S>,
    locks: CafLocks,
    usim_plans: UsimPlans,
    sync_timeout: Duration,
    retry: RetryPolicy,
    pool: SyncWorkerPool,
}

/// Drives CAFs through the activation pipeline.
///
/// Every change to one CAF runs under its lock in `CafLocks`. SYNC integration
/// calls are queued to a worker pool after the lock is released and their
/// answers come back through [`Orchestrator::apply_ack`], like callbacks.
pub struct Orchestrator<S, P, C> {
    inner: Arc<Inner<S, P, C>>,
}

impl<S, P, C> Clone for Orchestrator<S, P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, P, C> Orchestrator<S, P, C>
where
    S: OrchestrationStore + Clone + 'static,
    P: IdentityProvisioning + 'static,
    C: IntegrationClient + 'static,
{
    /// Creates the orchestrator and starts its SYNC worker pool.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(store: S, identity: P, client: C, config: OrchestratorConfig) -> Self {
        let resolver = ZoneResolver::new(store.clone(), config.default_zone);
        let dispatcher = Dispatcher::new(
            store.clone(),
            resolver.clone(),
            config.retry,
            config.callback_base_url,
        );
        let tracker = CallbackProcessor::new(store.clone());
        let sync_workers = config.sync_workers;

        let inner = Arc::new_cyclic(|weak| Inner {
            store,
            identity,
            client,
            resolver,
            dispatcher,
            tracker,
            locks: CafLocks::new(),
            usim_plans: config.usim_plans,
            sync_timeout: config.sync_timeout,
            retry: config.retry,
            pool: SyncWorkerPool::spawn(weak.clone(), sync_workers),
        });

        Self { inner }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Decodes and ingests a raw JSON submission.
    pub async fn ingest_json(&self, payload: &[u8]) -> Result<IngestOutcome> {
        let submission = Submission::from_json(payload)?;
        self.ingest(&submission).await
    }

    /// Creates a CAF in `PENDING_APPROVAL`, or returns the existing one.
    #[tracing::instrument(skip(self, submission), fields(caf_ref_no))]
    pub async fn ingest(&self, submission: &Submission) -> Result<IngestOutcome> {
        let inner = &self.inner;
        let validated = submission.validate(&inner.usim_plans)?;
        let caf_ref_no = validated.caf_ref_no.clone();
        tracing::Span::current().record("caf_ref_no", caf_ref_no.as_str());

        let _guard = inner.locks.lock(&caf_ref_no).await;

        if let Some(existing) = inner.store.get_caf(&caf_ref_no).await? {
            return Ok(duplicate_submission(existing));
        }

        let zone = inner
            .resolver
            .resolve_zone(validated.pos_agent_hrno.as_deref())
            .await;

        let permanent_imsi = if validated.is_usim {
            Some(
                inner
                    .identity
                    .permanent_imsi(&caf_ref_no, validated.imsi.as_deref())
                    .await?,
            )
        } else {
            None
        };

        let (caf, record) = Caf::ingest(validated, zone.value, permanent_imsi, Utc::now())
            .map_err(DomainError::from)?;

        let outcome = inner
            .retry
            .run(
                |_| inner.store.create_if_absent(caf.clone(), record.clone()),
                StoreError::is_transient,
            )
            .await?;

        match outcome {
            CreateOutcome::Created(caf) => {
                metrics::counter!("caf_ingested_total").increment(1);
                tracing::info!(
                    zone_code = %caf.zone_code,
                    zone_fallback = zone.fallback,
                    is_usim = caf.is_usim,
                    is_agent = caf.is_agent,
                    "CAF ingested"
                );
                Ok(IngestOutcome::Created(caf))
            }
            CreateOutcome::Existing(caf) => Ok(duplicate_submission(caf)),
        }
    }

    /// Applies the CSC decision; on approval the first integration step is dispatched.
    #[tracing::instrument(skip(self, caf_ref_no, approver_hrno, reason), fields(caf_ref_no = %caf_ref_no))]
    pub async fn csc_decision(
        &self,
        caf_ref_no: &CafRefNo,
        approved: bool,
        approver_hrno: Option<String>,
        reason: Option<String>,
    ) -> Result<Caf> {
        if let Some(ref approver) = approver_hrno {
            check_len("approver_hrno", approver, MAX_ACTOR_LEN)?;
        }

        let mut jobs = Vec::new();
        let result = async {
            let _guard = self.inner.locks.lock(caf_ref_no).await;
            let mut caf = self.load(caf_ref_no).await?;
            let expected = caf.status;

            let mut record = caf
                .transition(&Trigger::CscDecision { approved }, Utc::now())
                .map_err(|e| SagaError::from_transition(caf_ref_no, expected, e))?;
            if let Some(approver) = approver_hrno {
                record = record.with_actor(approver);
            }
            if let Some(reason) = reason {
                record = record.with_detail(reason);
            }
            self.persist_status(&caf, expected, record).await?;
            tracing::info!(approved, status = %caf.status, "CSC decision applied");

            if approved {
                self.advance_after(&mut caf, &mut jobs).await;
            }
            Ok::<_, SagaError>(caf)
        }
        .await;

        self.enqueue(jobs);
        observe(result)
    }

    /// Runs the sequencer for the CAF. Safe to call repeatedly.
    #[tracing::instrument(skip(self, caf_ref_no), fields(caf_ref_no = %caf_ref_no))]
    pub async fn advance(&self, caf_ref_no: &CafRefNo) -> Result<AdvanceOutcome> {
        let mut jobs = Vec::new();
        let result = async {
            let _guard = self.inner.locks.lock(caf_ref_no).await;
            let mut caf = self.load(caf_ref_no).await?;
            self.advance_locked(&mut caf, &mut jobs).await
        }
        .await;

        self.enqueue(jobs);
        observe(result)
    }

    /// Applies an acknowledgement for an outbox entry, at most once.
    ///
    /// `caf_ref_no`, when supplied by the caller, must match the entry's CAF.
    /// On success the next step is dispatched.
    #[tracing::instrument(skip(self, correlation_id, caf_ref_no), fields(correlation_id = %correlation_id))]
    pub async fn apply_ack(
        &self,
        correlation_id: &CorrelationId,
        status: AckStatus,
        caf_ref_no: Option<&CafRefNo>,
    ) -> Result<AckOutcome> {
        let inner = &self.inner;
        let entry = inner.tracker.lookup(correlation_id, caf_ref_no).await?;

        let mut jobs = Vec::new();
        let result = async {
            let _guard = inner.locks.lock(&entry.caf_ref_no).await;
            let mut outcome = inner.tracker.apply(correlation_id, status, None).await?;
            if status.is_success()
                && let AckOutcome::Applied { caf, .. } = &mut outcome
            {
                self.advance_after(caf, &mut jobs).await;
            }
            Ok::<_, SagaError>(outcome)
        }
        .await;

        self.enqueue(jobs);
        observe(result)
    }

    pub async fn get(&self, caf_ref_no: &CafRefNo) -> Result<Caf> {
        self.load(caf_ref_no).await
    }

    pub async fn status(&self, caf_ref_no: &CafRefNo) -> Result<CafSummary> {
        Ok(CafSummary::from(&self.load(caf_ref_no).await?))
    }

    /// Outbox entries for the CAF in creation order.
    pub async fn outbox(&self, caf_ref_no: &CafRefNo) -> Result<Vec<OutboxEntry>> {
        self.load(caf_ref_no).await?;
        Ok(self.inner.store.list_outbox(caf_ref_no).await?)
    }

    /// Transition audit trail for the CAF, oldest first.
    pub async fn history(&self, caf_ref_no: &CafRefNo) -> Result<Vec<TransitionRecord>> {
        self.load(caf_ref_no).await?;
        Ok(self.inner.store.transitions(caf_ref_no).await?)
    }

    /// Queues every SYNC entry still PENDING in the store, such as those left
    /// by a previous process. Entries resolved meanwhile are skipped by the worker.
    #[tracing::instrument(skip(self))]
    pub async fn resume_pending_sync(&self) -> Result<usize> {
        let pending = self.inner.store.list_pending(IntegrationMode::Sync).await?;
        let jobs: Vec<_> = pending.iter().map(SyncJob::for_entry).collect();
        let count = jobs.len();
        self.enqueue(jobs);
        if count > 0 {
            tracing::info!(count, "re-queued pending SYNC entries");
        }
        Ok(count)
    }

    /// SYNC jobs queued or running.
    pub fn sync_jobs_in_flight(&self) -> usize {
        self.inner.pool.in_flight()
    }

    /// Waits until the SYNC worker pool has no queued or running jobs.
    pub async fn wait_idle(&self) {
        self.inner.pool.wait_idle().await;
    }

    async fn load(&self, caf_ref_no: &CafRefNo) -> Result<Caf> {
        self.inner
            .store
            .get_caf(caf_ref_no)
            .await?
            .ok_or_else(|| SagaError::CafNotFound(caf_ref_no.clone()))
    }

    async fn persist_status(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<()> {
        let store = &self.inner.store;
        self.inner
            .retry
            .run(
                |_| store.update_status(caf, expected, record.clone()),
                StoreError::is_transient,
            )
            .await
            .map_err(|e| match e {
                StoreError::StaleStatus { actual, .. } => SagaError::StateConflict {
                    caf_ref_no: caf.caf_ref_no.clone(),
                    status: actual,
                    reason: format!("expected {expected}"),
                },
                other => SagaError::Store(other),
            })
    }

    /// Runs the next step. The caller holds the CAF's lock; SYNC jobs are
    /// collected in `jobs` and must be enqueued after the lock is released.
    async fn advance_locked(&self, caf: &mut Caf, jobs: &mut Vec<SyncJob>) -> Result<AdvanceOutcome> {
        match sequencer::next_action(caf) {
            NextAction::Dispatch(target) => {
                let entry = self.inner.dispatcher.dispatch(caf, target).await?;
                if entry.mode == IntegrationMode::Sync {
                    jobs.push(SyncJob::for_entry(&entry));
                }
                Ok(AdvanceOutcome::Dispatched(entry))
            }
            NextAction::Complete => {
                let expected = caf.status;
                let mut completed = caf.clone();
                let record = completed
                    .transition(&Trigger::CommissionSkipped, Utc::now())
                    .map_err(|e| SagaError::from_transition(&caf.caf_ref_no, expected, e))?
                    .with_detail("no POS agent");
                self.persist_status(&completed, expected, record).await?;
                *caf = completed;
                tracing::info!(caf_ref_no = %caf.caf_ref_no, "CAF completed without commission");
                Ok(AdvanceOutcome::Completed)
            }
            NextAction::Idle => Ok(AdvanceOutcome::Idle),
        }
    }

    /// Advances after a committed change. Failures leave the CAF where it is
    /// and are only logged; `advance` can be called again later.
    async fn advance_after(&self, caf: &mut Caf, jobs: &mut Vec<SyncJob>) {
        if let Err(e) = self.advance_locked(caf, jobs).await {
            tracing::error!(
                caf_ref_no = %caf.caf_ref_no,
                status = %caf.status,
                error = %e,
                "automatic advance failed"
            );
        }
    }

    fn enqueue(&self, jobs: Vec<SyncJob>) {
        for job in jobs {
            let correlation_id = job.correlation_id.clone();
            if let Err(e) = self.inner.pool.submit(job) {
                tracing::error!(correlation_id = %correlation_id, error = %e, "failed to queue SYNC job");
            }
        }
    }

    /// Delivers a SYNC entry: call with timeout, retry transport failures, then
    /// feed the answer back as an acknowledgement.
    #[tracing::instrument(skip(self, job), fields(caf_ref_no = %job.caf_ref_no, correlation_id = %job.correlation_id, target = %job.target))]
    async fn execute_sync(&self, job: SyncJob) {
        let inner = &self.inner;
        let max_attempts = inner.retry.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(inner.retry.backoff(attempt - 1)).await;
            }

            let entry = match inner.store.get_outbox(&job.correlation_id).await {
                Ok(Some(entry)) if entry.is_pending() => entry,
                Ok(_) => {
                    tracing::debug!("entry already resolved, skipping call");
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "could not load outbox entry");
                    last_error = e.to_string();
                    continue;
                }
            };

            let started = Instant::now();
            let result = match tokio::time::timeout(inner.sync_timeout, inner.client.invoke(&entry)).await {
                Ok(result) => result,
                Err(_) => Err(SagaError::Transport(format!(
                    "{} call timed out after {}ms",
                    job.target,
                    inner.sync_timeout.as_millis()
                ))),
            };
            metrics::histogram!("sync_dispatch_duration_seconds", "target" => job.target.as_str())
                .record(started.elapsed().as_secs_f64());

            let error = result.as_ref().err().map(ToString::to_string);
            match inner.store.record_attempt(&job.correlation_id, error).await {
                Err(StoreError::OutboxNotPending { .. }) => {
                    tracing::debug!("entry resolved during call");
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "could not record attempt"),
                Ok(_) => {}
            }

            match result {
                Ok(status) => {
                    let applied = inner
                        .retry
                        .run(
                            |_| self.apply_ack(&job.correlation_id, status, Some(&job.caf_ref_no)),
                            SagaError::is_transient,
                        )
                        .await;
                    if let Err(e) = applied {
                        tracing::error!(ack_status = %status, error = %e, "could not apply SYNC answer");
                    }
                    return;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, max_attempts, error = %e, "SYNC call failed");
                    last_error = e.to_string();
                }
                Err(e) => {
                    last_error = e.to_string();
                    break;
                }
            }
        }

        self.fail_dispatch(&job, last_error).await;
    }

    /// Marks the entry FAILED and moves the CAF to the target's failure state.
    async fn fail_dispatch(&self, job: &SyncJob, reason: String) {
        let inner = &self.inner;
        let failure = SagaError::DispatchFailed {
            correlation_id: job.correlation_id.clone(),
            target: job.target,
            reason,
        };
        let _guard = inner.locks.lock(&job.caf_ref_no).await;

        match inner
            .tracker
            .apply(&job.correlation_id, AckStatus::Failure, Some(failure.to_string()))
            .await
        {
            Ok(AckOutcome::Applied { caf, .. }) => {
                metrics::counter!("dispatch_failures_total", "target" => job.target.as_str())
                    .increment(1);
                tracing::error!(status = %caf.status, error = %failure, "SYNC dispatch gave up");
            }
            Ok(AckOutcome::Duplicate { .. }) => {
                tracing::debug!("entry resolved before failure could be recorded");
            }
            Err(e) => {
                tracing::error!(error = %e, cause = %failure, "could not record dispatch failure");
            }
        }
    }
}

#[async_trait::async_trait]
impl<S, P, C> SyncJobHandler for Inner<S, P, C>
where
    S: OrchestrationStore + Clone + 'static,
    P: IdentityProvisioning + 'static,
    C: IntegrationClient + 'static,
{
    async fn handle(self: Arc<Self>, job: SyncJob) {
        Orchestrator { inner: self }.execute_sync(job).await;
    }
}

fn duplicate_submission(caf: Caf) -> IngestOutcome {
    metrics::counter!("caf_duplicate_submissions_total").increment(1);
    tracing::info!(status = %caf.status, "duplicate submission, returning existing CAF");
    IngestOutcome::Duplicate(caf)
}

fn observe<T>(result: Result<T>) -> Result<T> {
    if let Err(SagaError::StateConflict {
        ref caf_ref_no,
        status,
        ref reason,
    }) = result
    {
        metrics::counter!("state_conflicts_total").increment(1);
        tracing::warn!(caf_ref_no = %caf_ref_no, status = %status, reason = %reason, "state conflict");
    }
    result
}
