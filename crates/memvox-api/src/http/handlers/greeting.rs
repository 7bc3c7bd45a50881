//! Call-start webhook handler: personalized first message.
//!
//! On the live-call critical path: must answer within the greeting
//! latency budget and must never error out to the agent. A missing
//! caller id yields `first_message: null`, which tells the platform to
//! use the agent's configured default.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use memvox_types::event::{CallStartRequest, CallStartResponse};
use memvox_types::memory::{AgentId, CallerId};

use crate::http::error::AppError;
use crate::http::handlers::verify_webhook;
use crate::state::AppState;

/// POST /webhook/call-start
pub async fn call_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallStartResponse>, AppError> {
    let request_id = Uuid::now_v7();
    verify_webhook(&state, &headers, &body)?;

    let request: CallStartRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid call-start payload: {e}")))?;

    let Some(caller_id) = request.caller_id() else {
        tracing::info!(%request_id, agent_id = %request.agent_id, "no caller id; deferring to default greeting");
        return Ok(Json(CallStartResponse {
            first_message: None,
        }));
    };

    let caller = CallerId::from(caller_id);
    let agent = AgentId::from(request.agent_id.as_str());
    let message = state.retrieval.greeting(&caller, &agent).await;

    tracing::info!(%request_id, agent_id = %agent, "greeting generated");
    Ok(Json(CallStartResponse {
        first_message: Some(message),
    }))
}
