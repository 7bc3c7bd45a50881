pub mod greeting;
pub mod jobs;
pub mod search;
pub mod webhook;

use axum::http::HeaderMap;
use chrono::Utc;

use memvox_core::auth::verify_signature;

use crate::http::error::AppError;
use crate::state::AppState;

/// Verify the `signature` header on an inbound webhook request.
///
/// Every webhook route calls this before touching the payload;
/// failures are rejected at the boundary with 401.
pub(crate) fn verify_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), AppError> {
    let header = headers.get("signature").and_then(|v| v.to_str().ok());
    verify_signature(
        &state.config.webhook_secret,
        body,
        header,
        state.config.memory.replay_tolerance_secs,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "webhook signature rejected");
        AppError::from(e)
    })
}
