//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::IdentifierError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// A dependency is unavailable; the client may retry.
    Unavailable(String),
    /// Orchestration error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => {
                tracing::error!(error = %msg, "service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::CafNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::CallbackMismatch {
            correlation_id,
            reason,
        } => (
            StatusCode::NOT_FOUND,
            format!("unknown correlation {correlation_id}: {reason}"),
        ),
        SagaError::StateConflict { .. } => (StatusCode::CONFLICT, err.to_string()),
        SagaError::IdentityProvisioning(_) | SagaError::WorkerPoolClosed => {
            tracing::error!(error = %err, "dependency failure");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        _ if err.is_transient() => {
            tracing::error!(error = %err, "transient failure");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<IdentifierError> for ApiError {
    fn from(err: IdentifierError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
