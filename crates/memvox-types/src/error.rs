use thiserror::Error;

use crate::llm::LlmError;

/// Errors from webhook signature verification.
///
/// All variants are rejected at the HTTP boundary with 401 and trigger
/// no internal processing.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("invalid timestamp value: '{0}'")]
    InvalidTimestamp(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("request timestamp outside replay window ({age_secs}s old)")]
    StaleTimestamp { age_secs: i64 },
}

/// Errors from the agent profile cache.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The identity provider failed and no cached value exists.
    #[error("agent profile unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the memory extraction engine.
///
/// Job-fatal: the whole extraction call fails, eligible for bounded
/// retry. Individually invalid candidates are dropped, not errors.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("unusable extraction response: {0}")]
    InvalidResponse(String),
}

impl ExtractionError {
    /// Whether the underlying failure is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Llm(e) => e.is_retryable(),
            ExtractionError::InvalidResponse(_) => false,
        }
    }
}

/// Errors from the deduplication/reinforcement engine.
///
/// `Conflict` must not occur under correct owner-scope serialization;
/// if observed it is a correctness bug, not a transient condition.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge conflict: {0}")]
    Conflict(String),
}

/// Errors from the memory-store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("store response decode error: {0}")]
    Decode(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Errors from the retrieval path.
///
/// Never surfaced to the calling agent: greeting and search degrade to
/// defaults/empty results instead.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval exceeded {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal failure kind attached to a failed extraction job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}
