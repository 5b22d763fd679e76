//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker::BrokerError;
use saga::SagaError;
use thiserror::Error;
use workers::WorkerError;

use crate::records::RecordError;

/// API-level error type that maps to HTTP responses with a
/// `{"error": message}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Publishing to the broker failed.
    #[error("Failed to publish event: {0}")]
    Broker(#[from] BrokerError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Record(RecordError::DuplicateEmail) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Saga(SagaError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Saga(SagaError::InvalidQuantity(_)) => StatusCode::BAD_REQUEST,
            ApiError::Saga(SagaError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Saga(SagaError::Publish(e)) | ApiError::Broker(e) if e.is_connectivity() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Record(RecordError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
