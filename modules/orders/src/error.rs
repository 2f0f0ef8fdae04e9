use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Failures on the intake path, mapped onto HTTP statuses by the
/// `IntoResponse` impl below.
///
/// Broker failures never appear here: by the time the dispatcher talks to
/// the broker the request has long been acknowledged.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    Validation(String),

    #[error("order {0} already exists")]
    Conflict(String),

    #[error("order {0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrderError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::Conflict(_) => StatusCode::CONFLICT,
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Storage(_) | OrderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation_error",
            OrderError::Conflict(_) => "conflict",
            OrderError::NotFound(_) => "not_found",
            OrderError::Storage(_) => "storage_error",
            OrderError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage details stay in the logs, not in the response body.
        let message = match &self {
            OrderError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure on request path");
                "A storage error occurred; the request can be retried".to_string()
            }
            OrderError::Internal(e) => {
                tracing::error!(error = %e, "Internal failure on request path");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.error_kind().to_string(),
            message,
        });
        (status, body).into_response()
    }
}
