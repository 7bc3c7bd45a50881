//! Inbound webhook event payloads and their fixed response shapes.
//!
//! Three events arrive from the voice platform, all HMAC-signed:
//! call-end (`post_call_transcription`), call-start (greeting), and
//! in-call memory search. The response shapes here are part of the
//! external contract and must not change.

use serde::{Deserialize, Serialize};

use crate::memory::SearchResult;

/// One ordered entry of a call transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    #[serde(default)]
    pub message: String,
}

/// Dynamic variables attached to platform events.
///
/// The caller identity travels under the `system__caller_id` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicVariables {
    #[serde(rename = "system__caller_id")]
    pub system_caller_id: Option<String>,
}

/// Call-initiation client data nested inside call-end events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationInitData {
    #[serde(default)]
    pub dynamic_variables: DynamicVariables,
}

/// A call-end webhook event (`type = post_call_transcription`).
#[derive(Debug, Clone, Deserialize)]
pub struct PostCallEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PostCallData,
}

/// Payload of a call-end event.
#[derive(Debug, Clone, Deserialize)]
pub struct PostCallData {
    pub conversation_id: String,
    pub agent_id: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub dynamic_variables: Option<DynamicVariables>,
    #[serde(default)]
    pub conversation_initiation_client_data: Option<ConversationInitData>,
}

impl PostCallData {
    /// Extract the caller identity from the event.
    ///
    /// Checks the nested conversation-initiation block first, then falls
    /// back to the top-level dynamic variables.
    pub fn caller_id(&self) -> Option<&str> {
        if let Some(init) = &self.conversation_initiation_client_data {
            if let Some(id) = init.dynamic_variables.system_caller_id.as_deref() {
                return Some(id);
            }
        }
        self.dynamic_variables
            .as_ref()
            .and_then(|v| v.system_caller_id.as_deref())
    }
}

/// Immediate acknowledgement returned for a call-end event.
#[derive(Debug, Clone, Serialize)]
pub struct PostCallAck {
    pub status: String,
    pub data: PostCallAckData,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostCallAckData {
    pub conversation_id: String,
    pub memory_extraction_queued: bool,
}

impl PostCallAck {
    pub fn new(conversation_id: &str, queued: bool) -> Self {
        Self {
            status: "success".to_string(),
            data: PostCallAckData {
                conversation_id: conversation_id.to_string(),
                memory_extraction_queued: queued,
            },
        }
    }
}

/// A call-start webhook event, requesting a personalized greeting.
#[derive(Debug, Clone, Deserialize)]
pub struct CallStartRequest {
    pub agent_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub dynamic_variables: Option<DynamicVariables>,
}

impl CallStartRequest {
    pub fn caller_id(&self) -> Option<&str> {
        self.dynamic_variables
            .as_ref()
            .and_then(|v| v.system_caller_id.as_deref())
    }
}

/// Greeting response. `first_message: null` tells the platform to use
/// the agent's configured default.
#[derive(Debug, Clone, Serialize)]
pub struct CallStartResponse {
    pub first_message: Option<String>,
}

/// An in-call memory search request from the agent tool.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub caller_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub search_all_agents: Option<bool>,
}

/// In-call search response: ranked results plus a one-line summary.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub summary: String,
    /// Which scopes were searched: a single agent id or "all".
    pub searched_agents: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_call_event_deserialize() {
        let json = r#"{
            "type": "post_call_transcription",
            "data": {
                "conversation_id": "conv_42",
                "agent_id": "agent_01",
                "transcript": [
                    {"role": "agent", "message": "Hello"},
                    {"role": "user", "message": "I want product XYZ-789, ship express"}
                ],
                "status": "done",
                "duration": 184,
                "conversation_initiation_client_data": {
                    "dynamic_variables": {"system__caller_id": "+15551234567"}
                }
            }
        }"#;
        let event: PostCallEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "post_call_transcription");
        assert_eq!(event.data.conversation_id, "conv_42");
        assert_eq!(event.data.transcript.len(), 2);
        assert_eq!(event.data.caller_id(), Some("+15551234567"));
    }

    #[test]
    fn test_caller_id_prefers_nested_block() {
        let json = r#"{
            "conversation_id": "conv_43",
            "agent_id": "agent_01",
            "dynamic_variables": {"system__caller_id": "+15550000000"},
            "conversation_initiation_client_data": {
                "dynamic_variables": {"system__caller_id": "+15551111111"}
            }
        }"#;
        let data: PostCallData = serde_json::from_str(json).unwrap();
        assert_eq!(data.caller_id(), Some("+15551111111"));
    }

    #[test]
    fn test_caller_id_falls_back_to_top_level() {
        let json = r#"{
            "conversation_id": "conv_44",
            "agent_id": "agent_01",
            "dynamic_variables": {"system__caller_id": "+15552222222"}
        }"#;
        let data: PostCallData = serde_json::from_str(json).unwrap();
        assert_eq!(data.caller_id(), Some("+15552222222"));
    }

    #[test]
    fn test_caller_id_missing() {
        let json = r#"{"conversation_id": "conv_45", "agent_id": "agent_01"}"#;
        let data: PostCallData = serde_json::from_str(json).unwrap();
        assert_eq!(data.caller_id(), None);
    }

    #[test]
    fn test_post_call_ack_shape() {
        let ack = PostCallAck::new("conv_42", true);
        let json = serde_json::to_string(&ack).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"memory_extraction_queued\":true"));
        assert!(json.contains("\"conversation_id\":\"conv_42\""));
    }

    #[test]
    fn test_search_request_defaults() {
        let json = r#"{
            "query": "shipping preference",
            "caller_id": "+15551234567",
            "agent_id": "agent_01"
        }"#;
        let req: SearchRequest = serde_json::from_str(json).unwrap();
        assert!(req.search_all_agents.is_none());
        assert!(req.conversation_id.is_none());
    }
}
