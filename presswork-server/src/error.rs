//! HTTP error mapping for presswork-server
//!
//! Every failure leaves the server as `{"error":{"code","message"}}` with a
//! status derived from the workflow error taxonomy.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use presswork_common::Error;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown entity id (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Missing or malformed input (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Entity state does not allow the action (409)
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Lost a race against another writer (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store temporarily unavailable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::InvalidTransition(msg) => ApiError::InvalidTransition(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::TransientIo(msg) => ApiError::Unavailable(msg),
            other => {
                error!(error = %other, "Unhandled workflow error");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidTransition(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unavailable(_) => "TRANSIENT_IO",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::InvalidTransition(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
