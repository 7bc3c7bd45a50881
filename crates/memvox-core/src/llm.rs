//! LlmProvider trait definition.
//!
//! The core abstraction over the language-model collaborator. Memvox
//! only needs non-streaming completions: extraction and greeting
//! generation are prompt-in/text-out calls.
//!
//! Implementations live in memvox-infra (e.g., `AnthropicProvider`).

use memvox_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Engines
/// are generic over the provider rather than boxing it.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
