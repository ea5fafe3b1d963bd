use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

/// §7 error kinds, mapped to HTTP status in `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or out-of-range input coordinates (C7/C8.submit).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A single spatial-store prefix read failed. C3 recovers these locally
    /// (logged, omitted); this variant exists for call sites that choose to
    /// surface one directly.
    #[error("Spatial store read failed: {0}")]
    StoreTransient(String),

    /// Route record creation failed — a hard failure, surfaced to the caller.
    #[error("Spatial store write failed: {0}")]
    StoreFatal(String),

    /// A job exceeded its deadline (30s assess, 5m optimize).
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Notification-sink POST failed; non-fatal, logged only by the worker.
    #[error("Failed to publish event: {0}")]
    PublishFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::StoreTransient(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::PublishFailed(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::DeadlineExceeded => {
                (StatusCode::GATEWAY_TIMEOUT, "Deadline exceeded".to_string())
            }
            AppError::StoreFatal(msg) => {
                tracing::error!("store fatal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::DatabaseError(err) => {
                tracing::error!("database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}
