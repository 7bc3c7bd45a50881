//! Call-end webhook handler.
//!
//! Receives `post_call_transcription` events, verifies the signature,
//! and queues memory extraction. The acknowledgement is synchronous and
//! returns before the pipeline starts: the webhook response never waits
//! on extraction.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use memvox_types::event::{PostCallAck, PostCallEvent};
use memvox_types::job::ExtractionJob;
use memvox_types::memory::OwnerScope;

use crate::http::error::AppError;
use crate::http::handlers::verify_webhook;
use crate::state::AppState;

/// POST /webhook/post-call
pub async fn post_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PostCallAck>, AppError> {
    let request_id = Uuid::now_v7();
    verify_webhook(&state, &headers, &body)?;

    let event: PostCallEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid webhook payload: {e}")))?;
    let data = event.data;
    let conversation_id = data.conversation_id.clone();

    // Unknown event types are acknowledged and ignored; the platform
    // retries on non-2xx, and there is nothing to retry here.
    if event.event_type != "post_call_transcription" {
        tracing::warn!(
            %request_id,
            event_type = %event.event_type,
            "ignoring unsupported webhook type"
        );
        return Ok(Json(PostCallAck::new(&conversation_id, false)));
    }

    let Some(caller_id) = data.caller_id().map(str::to_string) else {
        tracing::warn!(%request_id, %conversation_id, "no caller id; skipping memory extraction");
        return Ok(Json(PostCallAck::new(&conversation_id, false)));
    };
    let Some(agent_id) = data.agent_id.clone() else {
        tracing::warn!(%request_id, %conversation_id, "no agent id; skipping memory extraction");
        return Ok(Json(PostCallAck::new(&conversation_id, false)));
    };

    let job = ExtractionJob {
        conversation_id: conversation_id.clone(),
        scope: OwnerScope::new(caller_id, agent_id),
        transcript: data.transcript,
        duration_secs: data.duration.unwrap_or(0),
        call_status: data.status,
        enqueued_at: Utc::now(),
    };

    let queued = state.orchestrator.enqueue(job).is_ok();
    tracing::info!(%request_id, %conversation_id, queued, "call-end event acknowledged");

    Ok(Json(PostCallAck::new(&conversation_id, queued)))
}
