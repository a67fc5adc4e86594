//! Acknowledgement callbacks from external systems.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::{CafRefNo, CorrelationId};
use domain::{AckStatus, CafStatus, OutboxStatus};
use saga::AckOutcome;
use serde::{Deserialize, Serialize};
use store::OrchestrationStore;

use crate::error::ApiError;
use crate::routes::cafs::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub caf_ref_no: Option<String>,
    /// SUCCESS or FAILURE, any case.
    pub ack_status: AckStatus,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub correlation_id: CorrelationId,
    /// APPLIED, or DUPLICATE when the entry was already resolved.
    pub outcome: &'static str,
    pub entry_status: OutboxStatus,
    /// CAF status after the acknowledgement; absent for duplicates.
    pub caf_status: Option<CafStatus>,
}

/// POST /callbacks/:correlation_id — apply an acknowledgement.
///
/// Duplicates succeed without changing anything. An unknown id, or a
/// `caf_ref_no` that does not own the id, is a 404.
#[tracing::instrument(skip(state, payload))]
pub async fn receive<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(correlation_id): Path<String>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let Json(req) = payload?;
    let correlation_id = CorrelationId::new(correlation_id);
    let caf_ref_no = req.caf_ref_no.as_deref().map(CafRefNo::parse).transpose()?;

    let outcome = state
        .orchestrator
        .apply_ack(&correlation_id, req.ack_status, caf_ref_no.as_ref())
        .await?;

    let response = match outcome {
        AckOutcome::Applied { caf, entry } => CallbackResponse {
            correlation_id,
            outcome: "APPLIED",
            entry_status: entry.status,
            caf_status: Some(caf.status),
        },
        AckOutcome::Duplicate { entry } => CallbackResponse {
            correlation_id,
            outcome: "DUPLICATE",
            entry_status: entry.status,
            caf_status: None,
        },
    };
    metrics::counter!("callbacks_received_total", "outcome" => response.outcome).increment(1);

    Ok(Json(response))
}
