use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pairroom_sandbox::SandboxError;
use pairroom_storage::StorageError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Error type returned by every HTTP handler
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Room not found: {0}")]
    NotFound(String),

    #[error("Execution rejected: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Structured error response format for API consistency
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl AppError {
    fn to_status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Sandbox(SandboxError::UnsupportedLanguage(_)) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_LANGUAGE")
            }
            AppError::Sandbox(SandboxError::SourceTooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "SOURCE_TOO_LARGE")
            }
            AppError::Storage(StorageError::Duplicate(_)) => (StatusCode::CONFLICT, "DUPLICATE_ROOM"),
            AppError::Storage(StorageError::Timeout(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_TIMEOUT")
            }
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message safe to show to clients
    fn to_user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Validation failed: {}", msg),
            AppError::NotFound(id) => format!("Room '{}' not found", id),
            AppError::Sandbox(e) => e.to_string(),
            AppError::Storage(StorageError::Timeout(_)) => {
                "Storage did not respond in time".to_string()
            }
            AppError::Storage(_) => "Data storage error".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status_code, error_code) = self.to_status_and_code();

        if status_code.is_server_error() {
            error!(
                request_id = %request_id,
                error_code = %error_code,
                error = ?self,
                "Server error while handling request"
            );
        } else {
            info!(
                request_id = %request_id,
                error_code = %error_code,
                error = %self,
                "API error response"
            );
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message: self.to_user_message(),
            },
            request_id,
        };

        (status_code, Json(body)).into_response()
    }
}
