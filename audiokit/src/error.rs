//! Error types for the audiokit HTTP layer
//!
//! Every handler returns `ApiResult<T>`; failures are rendered as
//! `{"error": {"code", "message"}}` with the status code of their category.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::jobs::RegistryError;
use crate::storage::PathEscape;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad or missing input, range violations (400)
    #[error("{0}")]
    Validation(String),

    /// Unknown job id or missing file (404)
    #[error("{0}")]
    NotFound(String),

    /// Path escapes its base directory (403)
    #[error("{0}")]
    Forbidden(String),

    /// Required external tool missing (500)
    #[error("{0}")]
    DependencyUnavailable(String),

    /// External process exited non-zero (400)
    #[error("{0}")]
    ToolFailure(String),

    /// Request body over the upload limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// audiokit-common error
    #[error("Common error: {0}")]
    Common(#[from] audiokit_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::ToolFailure(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::DependencyUnavailable(_)
            | ApiError::Internal(_)
            | ApiError::Io(_)
            | ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            ApiError::ToolFailure(_) => "TOOL_FAILURE",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Io(_) => "IO_ERROR",
            ApiError::Common(_) => "COMMON_ERROR",
        }
    }
}

impl From<PathEscape> for ApiError {
    fn from(err: PathEscape) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ApiError::NotFound("Download not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        // Body limit overruns surface while reading fields
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("File too large. Maximum size is 100 MB".to_string())
        } else {
            ApiError::Validation(err.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
