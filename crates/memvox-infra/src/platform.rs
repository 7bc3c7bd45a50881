//! Voice-platform identity client.
//!
//! Fetches agent display profiles from the platform's agents API. Used
//! exclusively through the `AgentProfileCache`, which owns TTL and
//! single-flight behavior; this client is a thin fetch.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use memvox_core::profile::ProfileSource;
use memvox_types::agent::ProfileData;
use memvox_types::error::ProfileError;
use memvox_types::memory::AgentId;

/// Client for `GET {base}/agents/{agent_id}`.
pub struct PlatformClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl PlatformClient {
    pub fn new(base_url: String, api_key: Option<SecretString>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create reqwest client");
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

/// Agent profile payload as returned by the platform.
#[derive(Debug, Deserialize)]
struct AgentPayload {
    name: String,
    #[serde(default)]
    first_message: Option<String>,
}

impl ProfileSource for PlatformClient {
    async fn fetch_profile(&self, agent_id: &AgentId) -> Result<ProfileData, ProfileError> {
        let url = format!("{}/agents/{agent_id}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProfileError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileError::Unavailable(format!("HTTP {status}: {body}")));
        }

        let payload: AgentPayload = response
            .json()
            .await
            .map_err(|e| ProfileError::Unavailable(format!("decode failed: {e}")))?;

        tracing::debug!(agent_id = %agent_id, "fetched agent profile");
        Ok(ProfileData {
            display_name: payload.name,
            first_message: payload.first_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_payload_deserialize() {
        let json = r#"{"name": "Support Line", "first_message": "Hi there!"}"#;
        let payload: AgentPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.name, "Support Line");
        assert_eq!(payload.first_message.as_deref(), Some("Hi there!"));
    }

    #[test]
    fn test_agent_payload_without_first_message() {
        let json = r#"{"name": "Sales Desk", "voice": "alloy"}"#;
        let payload: AgentPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.name, "Sales Desk");
        assert!(payload.first_message.is_none());
    }
}
