//! In-call memory search handler.
//!
//! Invoked by the agent as a server tool mid-conversation. Latency
//! bounded and degradation-only: pipeline failures yield an empty
//! result set, never a 5xx (only auth failures are rejected).

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use memvox_types::event::{SearchRequest, SearchResponse};
use memvox_types::memory::{AgentId, CallerId};

use crate::http::error::AppError;
use crate::http::handlers::verify_webhook;
use crate::state::AppState;

/// POST /webhook/search-memory
pub async fn search_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SearchResponse>, AppError> {
    let request_id = Uuid::now_v7();
    verify_webhook(&state, &headers, &body)?;

    let request: SearchRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid search payload: {e}")))?;

    let caller = CallerId::from(request.caller_id.as_str());
    let agent = AgentId::from(request.agent_id.as_str());
    let search_all = request.search_all_agents.unwrap_or(false);

    let response = state
        .retrieval
        .search(&request.query, &caller, &agent, search_all)
        .await;

    tracing::info!(
        %request_id,
        agent_id = %agent,
        result_count = response.results.len(),
        searched_agents = %response.searched_agents,
        "memory search served"
    );
    Ok(Json(response))
}
