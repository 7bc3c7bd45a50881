//! Extraction job status lookup.
//!
//! Exposes the in-memory job board for observability: operators can
//! query a conversation's extraction state while it runs and after it
//! reaches a terminal state (for the lifetime of the process).

use axum::extract::{Path, State};
use axum::Json;

use memvox_types::job::JobState;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /jobs/{conversation_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<JobState>, AppError> {
    state
        .board
        .get(&conversation_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no job for conversation {conversation_id}")))
}
