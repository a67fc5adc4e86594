//! CAF intake, CSC approval, and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CafRefNo;
use domain::{Caf, CafStatus, OutboxEntry, TransitionRecord};
use saga::{
    AdvanceOutcome, CafSummary, InMemoryIdentityProvisioning, InMemoryIntegrationClient,
    IngestOutcome, Orchestrator,
};
use serde::{Deserialize, Serialize};
use store::OrchestrationStore;
use tokio::sync::mpsc;

use crate::error::ApiError;

/// Orchestrator wired with the collaborators the server runs with.
pub type CafOrchestrator<S> =
    Orchestrator<S, InMemoryIdentityProvisioning, InMemoryIntegrationClient>;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub orchestrator: CafOrchestrator<S>,
    /// Raw submissions waiting for the intake consumer.
    pub intake: mpsc::Sender<Vec<u8>>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalRequest {
    pub approved: bool,
    pub approver_hrno: Option<String>,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct QueuedResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct AdvanceResponse {
    pub outcome: &'static str,
    pub status: CafStatus,
    pub entry: Option<OutboxEntry>,
}

// -- Handlers --

/// POST /cafs — ingest a submission; 201 when created, 200 for a known reference.
#[tracing::instrument(skip(state, body))]
pub async fn ingest<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Caf>), ApiError> {
    match state.orchestrator.ingest_json(&body).await? {
        IngestOutcome::Created(caf) => Ok((StatusCode::CREATED, Json(caf))),
        IngestOutcome::Duplicate(caf) => Ok((StatusCode::OK, Json(caf))),
    }
}

/// POST /intake — queue a raw submission for the intake consumer.
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn intake<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Bytes,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    state
        .intake
        .send(body.to_vec())
        .await
        .map_err(|_| ApiError::Unavailable("intake consumer is not running".to_string()))?;
    metrics::counter!("intake_queued_total").increment(1);

    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { status: "queued" })))
}

/// GET /cafs/:caf_ref_no — current status and step.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(caf_ref_no): Path<String>,
) -> Result<Json<CafSummary>, ApiError> {
    let caf_ref_no = CafRefNo::parse(&caf_ref_no)?;
    Ok(Json(state.orchestrator.status(&caf_ref_no).await?))
}

/// POST /cafs/:caf_ref_no/approval — apply the CSC decision.
#[tracing::instrument(skip(state, payload))]
pub async fn approve<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(caf_ref_no): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Json<CafSummary>, ApiError> {
    let caf_ref_no = CafRefNo::parse(&caf_ref_no)?;
    let Json(req) = payload?;

    let caf = state
        .orchestrator
        .csc_decision(&caf_ref_no, req.approved, req.approver_hrno, req.reason)
        .await?;

    Ok(Json(CafSummary::from(&caf)))
}

/// POST /cafs/:caf_ref_no/next — run the sequencer for the CAF.
#[tracing::instrument(skip(state))]
pub async fn next<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(caf_ref_no): Path<String>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let caf_ref_no = CafRefNo::parse(&caf_ref_no)?;
    let outcome = state.orchestrator.advance(&caf_ref_no).await?;
    let status = state.orchestrator.status(&caf_ref_no).await?.status;

    let response = match outcome {
        AdvanceOutcome::Dispatched(entry) => AdvanceResponse {
            outcome: "DISPATCHED",
            status,
            entry: Some(entry),
        },
        AdvanceOutcome::Completed => AdvanceResponse {
            outcome: "COMPLETED",
            status,
            entry: None,
        },
        AdvanceOutcome::Idle => AdvanceResponse {
            outcome: "IDLE",
            status,
            entry: None,
        },
    };

    Ok(Json(response))
}

/// GET /cafs/:caf_ref_no/outbox — integration requests in creation order.
#[tracing::instrument(skip(state))]
pub async fn outbox<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(caf_ref_no): Path<String>,
) -> Result<Json<Vec<OutboxEntry>>, ApiError> {
    let caf_ref_no = CafRefNo::parse(&caf_ref_no)?;
    Ok(Json(state.orchestrator.outbox(&caf_ref_no).await?))
}

/// GET /cafs/:caf_ref_no/history — transition audit trail.
#[tracing::instrument(skip(state))]
pub async fn history<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(caf_ref_no): Path<String>,
) -> Result<Json<Vec<TransitionRecord>>, ApiError> {
    let caf_ref_no = CafRefNo::parse(&caf_ref_no)?;
    Ok(Json(state.orchestrator.history(&caf_ref_no).await?))
}
