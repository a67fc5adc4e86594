//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use store::OrchestrationStore;

use crate::routes::cafs::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// SYNC integration calls queued or running.
    pub sync_jobs_in_flight: usize,
}

/// GET /health — liveness plus worker pool backlog.
pub async fn check<S: OrchestrationStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sync_jobs_in_flight: state.orchestrator.sync_jobs_in_flight(),
    })
}
