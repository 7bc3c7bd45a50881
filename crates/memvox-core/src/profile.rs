//! Agent profile cache with TTL and single-flight refresh.
//!
//! Profiles come from the voice-platform identity API and change rarely,
//! so they are cached for a configurable TTL (default 24 hours). The
//! cache is an explicitly owned object injected through application
//! state -- never ambient global state -- and guarantees at most one
//! in-flight fetch per agent_id: concurrent callers during a refresh
//! await the same fetch instead of issuing their own.
//!
//! On provider failure the cache serves the last known value if one
//! exists (stale-but-available), and only fails when it has nothing.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use memvox_types::agent::{AgentProfile, ProfileData};
use memvox_types::error::ProfileError;
use memvox_types::memory::AgentId;

/// Collaborator trait for the identity provider.
///
/// Implementations live in memvox-infra (e.g., `PlatformClient`).
pub trait ProfileSource: Send + Sync {
    /// Fetch the display profile for an agent. May fail or time out.
    fn fetch_profile(
        &self,
        agent_id: &AgentId,
    ) -> impl std::future::Future<Output = Result<ProfileData, ProfileError>> + Send;
}

/// TTL-bounded cache of agent profiles with per-key refresh flights.
pub struct AgentProfileCache<S> {
    source: S,
    ttl: Duration,
    entries: DashMap<AgentId, AgentProfile>,
    /// Per-agent refresh guards. Holding a guard across the fetch await
    /// is the single-flight mechanism; the guard is keyed, never global.
    flights: DashMap<AgentId, Arc<Mutex<()>>>,
}

impl<S: ProfileSource> AgentProfileCache<S> {
    pub fn new(source: S, ttl_hours: u64) -> Self {
        Self {
            source,
            ttl: Duration::hours(ttl_hours as i64),
            entries: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// Get the profile for an agent, refreshing on miss or expiry.
    ///
    /// Concurrent callers for the same agent during a refresh wait for
    /// the in-flight fetch and then read the refreshed entry; they never
    /// trigger a second fetch.
    pub async fn get(&self, agent_id: &AgentId) -> Result<AgentProfile, ProfileError> {
        if let Some(profile) = self.fresh_entry(agent_id) {
            return Ok(profile);
        }

        let flight = self
            .flights
            .entry(agent_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = flight.lock().await;

        // Another caller may have completed the refresh while we waited.
        if let Some(profile) = self.fresh_entry(agent_id) {
            return Ok(profile);
        }

        match self.source.fetch_profile(agent_id).await {
            Ok(data) => {
                let now = Utc::now();
                let profile = AgentProfile {
                    agent_id: agent_id.clone(),
                    display_name: data.display_name,
                    first_message: data.first_message,
                    fetched_at: now,
                    ttl_expires_at: now + self.ttl,
                };
                tracing::debug!(agent_id = %agent_id, "refreshed agent profile");
                self.entries.insert(agent_id.clone(), profile.clone());
                Ok(profile)
            }
            Err(e) => {
                // Stale-but-available: an expired entry beats no entry.
                if let Some(stale) = self.entries.get(agent_id).map(|r| r.clone()) {
                    tracing::warn!(
                        agent_id = %agent_id,
                        error = %e,
                        "profile refresh failed; serving stale entry"
                    );
                    return Ok(stale);
                }
                tracing::warn!(agent_id = %agent_id, error = %e, "profile unavailable");
                Err(e)
            }
        }
    }

    /// Drop the cached entry for an agent, forcing a refresh on next get.
    pub fn invalidate(&self, agent_id: &AgentId) {
        self.entries.remove(agent_id);
    }

    /// Number of cached entries (fresh or stale).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fresh_entry(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        let entry = self.entries.get(agent_id)?;
        if entry.is_expired(Utc::now()) {
            return None;
        }
        Some(entry.clone())
    }
}
