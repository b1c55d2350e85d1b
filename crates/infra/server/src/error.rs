//! Server error types.

use axum::Json;
use axum::response::{IntoResponse, Response};
use eventgate_core::StoreError;
use eventgate_events::PipelineError;
use http::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request is malformed or incomplete.
    #[error("{0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Anything else went wrong.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Error raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Schema not found".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StoreError::unavailable("down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_status() {
        let response = ApiError::Validation("Missing required fields: domain".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
