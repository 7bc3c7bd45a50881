//! Memory types for Memvox.
//!
//! These types model the caller's long-term memory: facts extracted from
//! call transcripts that persist across conversations and agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Normalized caller key (e.g., an E.164 phone number).
///
/// Derived once per event from the `system__caller_id` dynamic variable
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallerId {
    fn from(s: &str) -> Self {
        CallerId(s.to_string())
    }
}

/// Stable key for a voice agent's memory partition and cached profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

/// The (caller, agent) pair that partitions memory records.
///
/// All deduplication and merge serialization is scoped to this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
    pub caller: CallerId,
    pub agent: AgentId,
}

impl OwnerScope {
    pub fn new(caller: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            caller: CallerId(caller.into()),
            agent: AgentId(agent.into()),
        }
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.caller, self.agent)
    }
}

/// Category of a memory record.
///
/// Candidates only ever merge with records of the same category;
/// "prefers email" and "filed a complaint" are never duplicates
/// regardless of text similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Factual,
    Preference,
    Issue,
    Emotional,
    Relational,
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryCategory::Factual => write!(f, "factual"),
            MemoryCategory::Preference => write!(f, "preference"),
            MemoryCategory::Issue => write!(f, "issue"),
            MemoryCategory::Emotional => write!(f, "emotional"),
            MemoryCategory::Relational => write!(f, "relational"),
        }
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "factual" => Ok(MemoryCategory::Factual),
            "preference" => Ok(MemoryCategory::Preference),
            "issue" => Ok(MemoryCategory::Issue),
            "emotional" => Ok(MemoryCategory::Emotional),
            "relational" => Ok(MemoryCategory::Relational),
            other => Err(format!("invalid memory category: '{other}'")),
        }
    }
}

/// A candidate memory produced by the extraction engine, pre-persistence.
///
/// Candidates that survive validation are handed to the dedup engine,
/// which either reinforces an existing record or creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub category: MemoryCategory,
    pub text: String,
    /// Importance score from 1 (minor detail) to 10 (critical).
    pub importance: u8,
}

/// A persisted memory record, unique by (scope, semantic content).
///
/// Near-duplicate text never produces a second record: the dedup engine
/// reinforces the existing record instead. Records are never deleted by
/// normal operation; retention is an external policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub scope: OwnerScope,
    pub category: MemoryCategory,
    pub text: String,
    /// Importance score from 1 (minor detail) to 10 (critical).
    pub importance: u8,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: DateTime<Utc>,
    /// Number of conversations that produced this fact (starts at 1).
    pub reinforcement_count: u32,
    /// Conversation that first created (or last reinforced) this record.
    pub source_conversation_id: String,
}

impl MemoryRecord {
    /// Build a fresh record from a validated candidate.
    pub fn from_candidate(
        candidate: &MemoryCandidate,
        scope: OwnerScope,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            scope,
            category: candidate.category,
            text: candidate.text.clone(),
            importance: candidate.importance,
            created_at: now,
            last_reinforced_at: now,
            reinforcement_count: 1,
            source_conversation_id: conversation_id.to_string(),
        }
    }
}

/// A memory record paired with a relevance score from the store's
/// similarity search, in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Transient search projection returned to the calling agent.
///
/// Never stored; computed per query from a [`MemoryHit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: String,
    pub relevance: f32,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    pub agent_id: AgentId,
}

impl From<&MemoryHit> for SearchResult {
    fn from(hit: &MemoryHit) -> Self {
        Self {
            memory: hit.record.text.clone(),
            relevance: hit.score,
            timestamp: hit.record.last_reinforced_at,
            conversation_id: hit.record.source_conversation_id.clone(),
            agent_id: hit.record.scope.agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_category_roundtrip() {
        for cat in [
            MemoryCategory::Factual,
            MemoryCategory::Preference,
            MemoryCategory::Issue,
            MemoryCategory::Emotional,
            MemoryCategory::Relational,
        ] {
            let s = cat.to_string();
            let parsed: MemoryCategory = s.parse().unwrap();
            assert_eq!(cat, parsed);
        }
    }

    #[test]
    fn test_memory_category_serde() {
        let cat = MemoryCategory::Preference;
        let json = serde_json::to_string(&cat).unwrap();
        assert_eq!(json, "\"preference\"");
        let parsed: MemoryCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, MemoryCategory::Preference);
    }

    #[test]
    fn test_owner_scope_display() {
        let scope = OwnerScope::new("+15551234567", "agent_01");
        assert_eq!(scope.to_string(), "+15551234567:agent_01");
    }

    #[test]
    fn test_record_from_candidate_starts_at_one() {
        let candidate = MemoryCandidate {
            category: MemoryCategory::Preference,
            text: "Caller prefers express shipping".to_string(),
            importance: 6,
        };
        let now = Utc::now();
        let record = MemoryRecord::from_candidate(
            &candidate,
            OwnerScope::new("+15551234567", "agent_01"),
            "conv_001",
            now,
        );
        assert_eq!(record.reinforcement_count, 1);
        assert_eq!(record.created_at, record.last_reinforced_at);
        assert_eq!(record.source_conversation_id, "conv_001");
    }

    #[test]
    fn test_memory_record_serialize() {
        let record = MemoryRecord {
            id: Uuid::now_v7(),
            scope: OwnerScope::new("+15551234567", "agent_01"),
            category: MemoryCategory::Factual,
            text: "Caller ordered product XYZ-789".to_string(),
            importance: 7,
            created_at: Utc::now(),
            last_reinforced_at: Utc::now(),
            reinforcement_count: 2,
            source_conversation_id: "conv_002".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"category\":\"factual\""));
        assert!(json.contains("\"reinforcement_count\":2"));
    }

    #[test]
    fn test_search_result_from_hit() {
        let record = MemoryRecord {
            id: Uuid::now_v7(),
            scope: OwnerScope::new("+15551234567", "agent_01"),
            category: MemoryCategory::Issue,
            text: "Caller reported a billing error".to_string(),
            importance: 8,
            created_at: Utc::now(),
            last_reinforced_at: Utc::now(),
            reinforcement_count: 1,
            source_conversation_id: "conv_003".to_string(),
        };
        let hit = MemoryHit { record, score: 0.91 };
        let result = SearchResult::from(&hit);
        assert_eq!(result.memory, "Caller reported a billing error");
        assert!((result.relevance - 0.91).abs() < f32::EPSILON);
        assert_eq!(result.agent_id.as_str(), "agent_01");
    }
}
