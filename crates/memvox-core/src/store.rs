//! MemoryStore trait definition.
//!
//! The external memory service is treated as a key-value store with a
//! similarity-search primitive. This trait is the boundary: the core
//! never sees HTTP. Follows the same RPITIT pattern as `LlmProvider`.

use memvox_types::error::StoreError;
use memvox_types::memory::{AgentId, CallerId, MemoryHit, MemoryRecord, OwnerScope};

/// Collaborator trait for persisted caller memories.
///
/// Implementations live in memvox-infra (e.g., `MemoryServiceClient`).
pub trait MemoryStore: Send + Sync {
    /// All records for one (caller, agent) scope, newest first.
    fn query_scope(
        &self,
        scope: &OwnerScope,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, StoreError>> + Send;

    /// All records for a caller across every agent scope, newest first.
    fn query_caller(
        &self,
        caller: &CallerId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, StoreError>> + Send;

    /// Similarity search over a caller's memories, optionally filtered
    /// to one agent scope. Hits carry a relevance score in [0, 1].
    fn search(
        &self,
        caller: &CallerId,
        query: &str,
        agent: Option<&AgentId>,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryHit>, StoreError>> + Send;

    /// Persist a newly created record.
    fn insert(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Persist a reinforcement update to an existing record.
    fn reinforce(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
