//! Application error type mapping to HTTP status codes.
//!
//! Only boundary failures surface as errors: authentication is rejected
//! with 401 before any processing, unparseable payloads with 400. The
//! retrieval paths never produce errors at all -- they degrade inside
//! the engine (see `RetrievalEngine`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use memvox_types::error::AuthError;

#[derive(Debug)]
pub enum AppError {
    /// Signature verification failed; rejected with no processing.
    Unauthorized(String),
    /// Payload failed validation.
    Validation(String),
    /// Resource lookup miss (job status board).
    NotFound(String),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
