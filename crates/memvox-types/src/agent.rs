//! Agent profile types.
//!
//! Profiles are fetched from the voice-platform identity API and cached
//! with a TTL. The cache owns them exclusively: entries are recreated
//! whole on expiry, never partially updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::AgentId;

/// A cached agent display profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub display_name: String,
    /// The agent's configured default first message, if any.
    pub first_message: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_expires_at: DateTime<Utc>,
}

impl AgentProfile {
    /// Whether this entry has passed its TTL at the given instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl_expires_at
    }
}

/// Raw profile payload as returned by the identity provider, before the
/// cache stamps it with fetch/expiry timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileData {
    pub display_name: String,
    #[serde(default)]
    pub first_message: Option<String>,
}
