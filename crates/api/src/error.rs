//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use filestore_core::files::FileError;
use filestore_shared::AppError;
use serde_json::json;
use tracing::error;

/// Error returned by handlers, rendered as `{ "error": code, "message": msg }`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Server faults are logged in full and reported generically.
        let message = if self.0.is_server_error() {
            error!(error = %self.0, "Request failed");
            match self.0 {
                AppError::ServiceUnavailable(_) => "Storage is temporarily unavailable".to_string(),
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(json!({
                "error": self.0.error_code(),
                "message": message,
            })),
        )
            .into_response()
    }
}

/// Handler result alias.
pub type ApiResult<T> = Result<T, ApiError>;
