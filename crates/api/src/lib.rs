//! HTTP API server for the CAF activation saga.
//!
//! Provides REST endpoints for intake, CSC approval, status queries, and
//! integration callbacks, plus a channel-fed intake consumer, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod consumer;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryIdentityProvisioning, InMemoryIntegrationClient, Orchestrator};
use store::OrchestrationStore;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use consumer::{INTAKE_CAPACITY, IntakeConsumer};
use routes::cafs::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrchestrationStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/cafs", post(routes::cafs::ingest::<S>))
        .route("/intake", post(routes::cafs::intake::<S>))
        .route("/cafs/{caf_ref_no}", get(routes::cafs::get::<S>))
        .route("/cafs/{caf_ref_no}/approval", post(routes::cafs::approve::<S>))
        .route("/cafs/{caf_ref_no}/next", post(routes::cafs::next::<S>))
        .route("/cafs/{caf_ref_no}/outbox", get(routes::cafs::outbox::<S>))
        .route("/cafs/{caf_ref_no}/history", get(routes::cafs::history::<S>))
        .route(
            "/callbacks/{correlation_id}",
            post(routes::callbacks::receive::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store` with in-memory collaborators.
///
/// The returned consumer must be spawned for `POST /intake` to make progress.
/// Must be called within a Tokio runtime.
pub fn create_default_state<S: OrchestrationStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S>>, IntakeConsumer<S>) {
    let orchestrator = Orchestrator::new(
        store,
        InMemoryIdentityProvisioning::new(),
        InMemoryIntegrationClient::new(),
        config.orchestrator(),
    );
    let (intake, receiver) = mpsc::channel(INTAKE_CAPACITY);
    let consumer = IntakeConsumer::new(orchestrator.clone(), receiver);

    let state = Arc::new(AppState {
        orchestrator,
        intake,
    });

    (state, consumer)
}
