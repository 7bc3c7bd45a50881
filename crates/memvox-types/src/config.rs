//! Memory policy configuration.
//!
//! All thresholds, TTLs, and latency budgets that govern the memory
//! lifecycle live here as documented defaults, so the merge and
//! retrieval policies stay tunable without code changes.

use serde::{Deserialize, Serialize};

/// Tunable policy knobs for the memory lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Agent profile cache TTL in hours.
    #[serde(default = "default_profile_ttl_hours")]
    pub profile_ttl_hours: u64,

    /// Dedup similarity threshold: candidates scoring at or above this
    /// against a same-category record reinforce instead of creating.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Same-agent search confidence below which the cross-agent
    /// fallback search triggers automatically.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Minimal relevance a hit must clear to appear in search results.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,

    /// Minimum importance for a memory to be visible across agents.
    #[serde(default = "default_high_importance_threshold")]
    pub high_importance_threshold: u8,

    /// Maximum accepted age of a signed request, in seconds.
    #[serde(default = "default_replay_tolerance_secs")]
    pub replay_tolerance_secs: i64,

    /// Hard latency budget for the greeting path.
    #[serde(default = "default_greeting_timeout_ms")]
    pub greeting_timeout_ms: u64,

    /// Hard latency budget for the in-call search path.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Maximum extraction attempts per job (first try included).
    #[serde(default = "default_extract_max_attempts")]
    pub extract_max_attempts: u32,

    /// Result cap for search responses.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Cap on cross-agent memories included in greeting context.
    #[serde(default = "default_cross_agent_limit")]
    pub cross_agent_limit: usize,

    /// Bounded extraction queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_profile_ttl_hours() -> u64 {
    24
}

fn default_similarity_threshold() -> f32 {
    0.85
}

fn default_relevance_threshold() -> f32 {
    0.7
}

fn default_relevance_floor() -> f32 {
    0.25
}

fn default_high_importance_threshold() -> u8 {
    8
}

fn default_replay_tolerance_secs() -> i64 {
    30 * 60
}

fn default_greeting_timeout_ms() -> u64 {
    2_000
}

fn default_search_timeout_ms() -> u64 {
    3_000
}

fn default_extract_max_attempts() -> u32 {
    3
}

fn default_search_limit() -> usize {
    5
}

fn default_cross_agent_limit() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            profile_ttl_hours: default_profile_ttl_hours(),
            similarity_threshold: default_similarity_threshold(),
            relevance_threshold: default_relevance_threshold(),
            relevance_floor: default_relevance_floor(),
            high_importance_threshold: default_high_importance_threshold(),
            replay_tolerance_secs: default_replay_tolerance_secs(),
            greeting_timeout_ms: default_greeting_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
            extract_max_attempts: default_extract_max_attempts(),
            search_limit: default_search_limit(),
            cross_agent_limit: default_cross_agent_limit(),
            queue_capacity: default_queue_capacity(),
        }
    }
}
