//! Application state wiring all services together.
//!
//! The engines are generic over the collaborator traits; AppState pins
//! them to the concrete infra implementations and owns their lifecycle:
//! the profile cache and orchestrator are created at startup, injected
//! here, and torn down through the cancellation token on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use memvox_core::job::{JobBoard, JobPipeline, Orchestrator};
use memvox_core::profile::AgentProfileCache;
use memvox_core::retrieval::RetrievalEngine;
use memvox_core::retry::RetryPolicy;
use memvox_infra::config::MemvoxConfig;
use memvox_infra::llm::anthropic::AnthropicProvider;
use memvox_infra::memory_service::MemoryServiceClient;
use memvox_infra::platform::PlatformClient;

/// Concrete type aliases for the engine generics pinned to infra
/// implementations.
pub type ConcreteProfileCache = AgentProfileCache<PlatformClient>;
pub type ConcreteRetrieval =
    RetrievalEngine<MemoryServiceClient, AnthropicProvider, PlatformClient>;
pub type ConcretePipeline = JobPipeline<MemoryServiceClient, AnthropicProvider, PlatformClient>;

/// Shared application state used by all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MemvoxConfig>,
    pub retrieval: Arc<ConcreteRetrieval>,
    pub orchestrator: Arc<Orchestrator>,
    pub board: Arc<JobBoard>,
    pub cancel: CancellationToken,
}

impl AppState {
    /// Wire clients, cache, engines, and the orchestrator.
    pub fn init(config: MemvoxConfig) -> anyhow::Result<Self> {
        let llm_api_key = config
            .llm_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MEMVOX_LLM_API_KEY is required to serve"))?;

        let store = Arc::new(MemoryServiceClient::new(
            config.memory_api_url.clone(),
            config.memory_api_key.clone(),
        ));
        let llm = Arc::new(AnthropicProvider::new(
            llm_api_key,
            config.llm_model.clone(),
            config.llm_timeout_secs,
        ));
        let platform = PlatformClient::new(
            config.platform_api_url.clone(),
            config.platform_api_key.clone(),
        );
        let profiles: Arc<ConcreteProfileCache> = Arc::new(AgentProfileCache::new(
            platform,
            config.memory.profile_ttl_hours,
        ));

        let retrieval = Arc::new(RetrievalEngine::new(
            Arc::clone(&store),
            Arc::clone(&llm),
            Arc::clone(&profiles),
            config.memory.clone(),
            config.llm_model.clone(),
        ));

        let retry = RetryPolicy::new(
            config.memory.extract_max_attempts,
            Duration::from_secs(60),
            5,
        );
        let pipeline: Arc<ConcretePipeline> = Arc::new(JobPipeline::new(
            store,
            llm,
            profiles,
            &config.memory,
            retry,
            config.llm_model.clone(),
        ));
        let board = pipeline.board();

        let cancel = CancellationToken::new();
        let orchestrator = Arc::new(Orchestrator::spawn(
            pipeline,
            config.memory.queue_capacity,
            cancel.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            retrieval,
            orchestrator,
            board,
            cancel,
        })
    }
}
