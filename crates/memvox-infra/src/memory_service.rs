//! HTTP client for the external memory service.
//!
//! The memory service is a key-value store with a semantic-search
//! primitive. Records are stored under the caller id with the full
//! record embedded in metadata, so every query can reconstruct
//! [`MemoryRecord`] values without a second lookup. Entries whose
//! metadata cannot be reconstructed are skipped with a warning rather
//! than failing the whole query.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use memvox_core::store::MemoryStore;
use memvox_types::error::StoreError;
use memvox_types::memory::{
    AgentId, CallerId, MemoryCategory, MemoryHit, MemoryRecord, OwnerScope,
};

/// Connection-pooled client for the memory service API.
pub struct MemoryServiceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl MemoryServiceClient {
    pub fn new(base_url: String, api_key: Option<SecretString>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create reqwest client");
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        builder
    }

    async fn search_raw(
        &self,
        caller: &CallerId,
        query: Option<&str>,
        agent: Option<&AgentId>,
        limit: usize,
    ) -> Result<Vec<ServiceMemory>, StoreError> {
        let body = SearchBody {
            user_id: caller.as_str(),
            query,
            filter: agent.map(|a| serde_json::json!({ "metadata.agent_id": a.as_str() })),
            limit,
        };

        let response = self
            .post("/memory/search")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let parsed: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(parsed.into_items())
    }
}

impl MemoryStore for MemoryServiceClient {
    async fn query_scope(
        &self,
        scope: &OwnerScope,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let items = self
            .search_raw(&scope.caller, None, Some(&scope.agent), limit)
            .await?;
        Ok(items
            .into_iter()
            .filter_map(|item| to_record(&scope.caller, item))
            .collect())
    }

    async fn query_caller(
        &self,
        caller: &CallerId,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let items = self.search_raw(caller, None, None, limit).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| to_record(caller, item))
            .collect())
    }

    async fn search(
        &self,
        caller: &CallerId,
        query: &str,
        agent: Option<&AgentId>,
        limit: usize,
    ) -> Result<Vec<MemoryHit>, StoreError> {
        let items = self.search_raw(caller, Some(query), agent, limit).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let score = item.score.unwrap_or(0.0).clamp(0.0, 1.0);
                to_record(caller, item).map(|record| MemoryHit { record, score })
            })
            .collect())
    }

    async fn insert(&self, record: &MemoryRecord) -> Result<(), StoreError> {
        let body = StoreBody {
            user_id: record.scope.caller.as_str(),
            content: &record.text,
            metadata: RecordMetadata::from_record(record),
        };
        let response = self
            .post("/memory/store")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        tracing::debug!(record_id = %record.id, "stored memory record");
        Ok(())
    }

    async fn reinforce(&self, record: &MemoryRecord) -> Result<(), StoreError> {
        let body = ReinforceBody {
            importance: record.importance,
            reinforcement_count: record.reinforcement_count,
            last_reinforced_at: record.last_reinforced_at,
            conversation_id: &record.source_conversation_id,
        };
        let response = self
            .post(&format!("/memory/reinforce/{}", record.id))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        tracing::debug!(
            record_id = %record.id,
            count = record.reinforcement_count,
            "reinforced memory record"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Record fields persisted in service metadata, enough to reconstruct
/// the [`MemoryRecord`] on read.
#[derive(Debug, Serialize, Deserialize)]
struct RecordMetadata {
    record_id: Uuid,
    agent_id: String,
    conversation_id: String,
    category: MemoryCategory,
    importance: u8,
    created_at: DateTime<Utc>,
    last_reinforced_at: DateTime<Utc>,
    reinforcement_count: u32,
}

impl RecordMetadata {
    fn from_record(record: &MemoryRecord) -> Self {
        Self {
            record_id: record.id,
            agent_id: record.scope.agent.as_str().to_string(),
            conversation_id: record.source_conversation_id.clone(),
            category: record.category,
            importance: record.importance,
            created_at: record.created_at,
            last_reinforced_at: record.last_reinforced_at,
            reinforcement_count: record.reinforcement_count,
        }
    }
}

#[derive(Serialize)]
struct StoreBody<'a> {
    user_id: &'a str,
    content: &'a str,
    metadata: RecordMetadata,
}

#[derive(Serialize)]
struct ReinforceBody<'a> {
    importance: u8,
    reinforcement_count: u32,
    last_reinforced_at: DateTime<Utc>,
    conversation_id: &'a str,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
    limit: usize,
}

/// One memory entry as returned by the service.
#[derive(Debug, Deserialize)]
struct ServiceMemory {
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<RecordMetadata>,
}

/// The service wraps results under either `memories` or `results`.
#[derive(Debug, Default, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    memories: Vec<ServiceMemory>,
    #[serde(default)]
    results: Vec<ServiceMemory>,
}

impl SearchResponseBody {
    fn into_items(self) -> Vec<ServiceMemory> {
        if self.memories.is_empty() {
            self.results
        } else {
            self.memories
        }
    }
}

fn to_record(caller: &CallerId, item: ServiceMemory) -> Option<MemoryRecord> {
    let Some(meta) = item.metadata else {
        tracing::warn!("skipping memory entry without metadata");
        return None;
    };
    if item.content.is_empty() {
        tracing::warn!(record_id = %meta.record_id, "skipping memory entry with empty content");
        return None;
    }
    Some(MemoryRecord {
        id: meta.record_id,
        scope: OwnerScope {
            caller: caller.clone(),
            agent: AgentId(meta.agent_id),
        },
        category: meta.category,
        text: item.content,
        importance: meta.importance,
        created_at: meta.created_at,
        last_reinforced_at: meta.last_reinforced_at,
        reinforcement_count: meta.reinforcement_count,
        source_conversation_id: meta.conversation_id,
    })
}

fn transport_error(e: reqwest::Error) -> StoreError {
    StoreError::Connection(e.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        code: status.as_u16(),
        body,
    })
}
