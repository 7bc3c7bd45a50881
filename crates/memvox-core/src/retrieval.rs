//! Retrieval and ranking for the live-call paths.
//!
//! Two synchronous, latency-bounded operations feed active calls:
//! greeting generation at call start and in-call memory search. Both
//! run under a hard tokio timeout and degrade -- to the default first
//! message or an empty result set -- instead of surfacing errors, since
//! a broken greeting or search must never break the conversation.
//!
//! Search applies the cross-scope fallback policy: when the best
//! same-agent hit scores below the relevance threshold and the caller
//! did not explicitly ask for all agents, the search silently broadens
//! to every scope the caller has history with and merge-ranks the
//! combined results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use memvox_types::agent::AgentProfile;
use memvox_types::config::MemoryConfig;
use memvox_types::error::RetrievalError;
use memvox_types::event::SearchResponse;
use memvox_types::llm::{CompletionRequest, Message, MessageRole};
use memvox_types::memory::{AgentId, CallerId, MemoryHit, MemoryRecord, OwnerScope, SearchResult};

use crate::llm::LlmProvider;
use crate::profile::{AgentProfileCache, ProfileSource};
use crate::store::MemoryStore;

/// Fixed fallback when no profile default is available either.
pub const DEFAULT_FIRST_MESSAGE: &str = "Hello! How can I help you today?";

/// Summary used whenever a search produces nothing usable.
const EMPTY_SEARCH_SUMMARY: &str = "No relevant memories found.";

/// Upper bound on records loaded when assembling greeting context.
const CONTEXT_QUERY_LIMIT: usize = 1_000;

/// Memory context assembled for greeting personalization.
#[derive(Debug, Default)]
pub struct GreetingContext {
    /// Memories from the caller's most recent prior conversation with
    /// this agent.
    pub last_conversation: Vec<MemoryRecord>,
    /// High-importance memories from the caller's other agents.
    pub cross_agent: Vec<MemoryRecord>,
}

/// Serves the greeting and in-call search paths.
pub struct RetrievalEngine<S, P, F> {
    store: Arc<S>,
    llm: Arc<P>,
    profiles: Arc<AgentProfileCache<F>>,
    config: MemoryConfig,
    model: String,
}

impl<S, P, F> RetrievalEngine<S, P, F>
where
    S: MemoryStore,
    P: LlmProvider,
    F: ProfileSource,
{
    pub fn new(
        store: Arc<S>,
        llm: Arc<P>,
        profiles: Arc<AgentProfileCache<F>>,
        config: MemoryConfig,
        model: String,
    ) -> Self {
        Self {
            store,
            llm,
            profiles,
            config,
            model,
        }
    }

    /// Produce the first message for a returning caller.
    ///
    /// Total: every failure mode (profile miss, store error, empty
    /// memory set, LLM failure, timeout) falls back to the agent's
    /// default first message or [`DEFAULT_FIRST_MESSAGE`].
    #[tracing::instrument(name = "greeting", skip(self), fields(caller = %caller, agent = %agent))]
    pub async fn greeting(&self, caller: &CallerId, agent: &AgentId) -> String {
        let budget = Duration::from_millis(self.config.greeting_timeout_ms);
        match tokio::time::timeout(budget, self.personalized_greeting(caller, agent)).await {
            Ok(message) => message,
            Err(_) => {
                tracing::warn!(
                    budget_ms = self.config.greeting_timeout_ms,
                    "greeting exceeded latency budget; using default"
                );
                DEFAULT_FIRST_MESSAGE.to_string()
            }
        }
    }

    /// Memory context for greeting generation.
    ///
    /// Last-conversation memories are grouped by source conversation and
    /// the most-recently-touched group wins. Cross-agent memories are
    /// admitted at or above the high-importance threshold only, sorted
    /// by importance.
    pub async fn greeting_context(
        &self,
        caller: &CallerId,
        agent: &AgentId,
    ) -> Result<GreetingContext, RetrievalError> {
        let scope = OwnerScope {
            caller: caller.clone(),
            agent: agent.clone(),
        };
        let scoped = self.store.query_scope(&scope, CONTEXT_QUERY_LIMIT).await?;
        let last_conversation = latest_conversation(scoped);

        let all = self.store.query_caller(caller, CONTEXT_QUERY_LIMIT).await?;
        let mut cross_agent: Vec<MemoryRecord> = all
            .into_iter()
            .filter(|r| {
                r.scope.agent != *agent && r.importance >= self.config.high_importance_threshold
            })
            .collect();
        cross_agent.sort_by(|a, b| b.importance.cmp(&a.importance));
        cross_agent.truncate(self.config.cross_agent_limit);

        Ok(GreetingContext {
            last_conversation,
            cross_agent,
        })
    }

    async fn personalized_greeting(&self, caller: &CallerId, agent: &AgentId) -> String {
        let profile = self.profiles.get(agent).await.ok();
        let default = profile
            .as_ref()
            .and_then(|p| p.first_message.clone())
            .unwrap_or_else(|| DEFAULT_FIRST_MESSAGE.to_string());

        let context = match self.greeting_context(caller, agent).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "greeting context unavailable; using default");
                return default;
            }
        };

        if context.last_conversation.is_empty() {
            tracing::debug!("no prior memories; using default first message");
            return default;
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: MessageRole::User,
                content: build_greeting_prompt(profile.as_ref(), &default, &context),
            }],
            system: None,
            max_tokens: 150,
            temperature: Some(0.7),
            stop_sequences: None,
        };

        match self.llm.complete(&request).await {
            Ok(response) => {
                let message = response.content.trim();
                if message.is_empty() {
                    default
                } else {
                    message.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "greeting generation failed; using default");
                default
            }
        }
    }

    /// In-call memory search with cross-scope fallback.
    ///
    /// Total: store errors and timeouts degrade to an empty result set.
    #[tracing::instrument(
        name = "search_memories",
        skip(self, query),
        fields(caller = %caller, agent = %agent, search_all = search_all)
    )]
    pub async fn search(
        &self,
        query: &str,
        caller: &CallerId,
        agent: &AgentId,
        search_all: bool,
    ) -> SearchResponse {
        let budget = Duration::from_millis(self.config.search_timeout_ms);
        match tokio::time::timeout(budget, self.search_inner(query, caller, agent, search_all))
            .await
        {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    budget_ms = self.config.search_timeout_ms,
                    "search exceeded latency budget; returning empty result"
                );
                empty_response(if search_all {
                    "all".to_string()
                } else {
                    agent.to_string()
                })
            }
        }
    }

    async fn search_inner(
        &self,
        query: &str,
        caller: &CallerId,
        agent: &AgentId,
        search_all: bool,
    ) -> SearchResponse {
        let limit = self.config.search_limit;

        if !search_all {
            let same_agent = match self.store.search(caller, query, Some(agent), limit).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(error = %e, "same-agent search failed");
                    return empty_response(agent.to_string());
                }
            };

            let best = same_agent.iter().map(|h| h.score).fold(0.0_f32, f32::max);
            if best >= self.config.relevance_threshold {
                tracing::debug!(best_score = best, "same-agent results confident");
                return self.respond(same_agent, agent.to_string());
            }

            // Low confidence triggers an implicit broadening even though
            // the caller did not ask for it.
            tracing::info!(
                best_score = best,
                threshold = self.config.relevance_threshold,
                "same-agent confidence low; broadening to all agents"
            );
            let broadened = match self.store.search(caller, query, None, limit).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!(error = %e, "cross-agent search failed");
                    Vec::new()
                }
            };
            let merged = merge_rank(same_agent, broadened, limit);
            return self.respond(merged, "all".to_string());
        }

        match self.store.search(caller, query, None, limit).await {
            Ok(hits) => self.respond(hits, "all".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "cross-agent search failed");
                empty_response("all".to_string())
            }
        }
    }

    fn respond(&self, hits: Vec<MemoryHit>, searched_agents: String) -> SearchResponse {
        let hits: Vec<MemoryHit> = hits
            .into_iter()
            .filter(|h| h.score >= self.config.relevance_floor)
            .collect();
        if hits.is_empty() {
            return empty_response(searched_agents);
        }
        let results: Vec<SearchResult> = hits.iter().map(SearchResult::from).collect();
        SearchResponse {
            summary: summarize(&hits),
            results,
            searched_agents,
        }
    }
}

fn empty_response(searched_agents: String) -> SearchResponse {
    SearchResponse {
        results: Vec::new(),
        summary: EMPTY_SEARCH_SUMMARY.to_string(),
        searched_agents,
    }
}

/// Keep the memories of the most-recently-touched conversation only.
fn latest_conversation(records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
    let mut by_conversation: HashMap<String, Vec<MemoryRecord>> = HashMap::new();
    for record in records {
        by_conversation
            .entry(record.source_conversation_id.clone())
            .or_default()
            .push(record);
    }

    by_conversation
        .into_values()
        .max_by_key(|group| {
            group
                .iter()
                .map(|r| r.last_reinforced_at)
                .max()
                .expect("group is non-empty")
        })
        .unwrap_or_default()
}

/// Merge two hit sets, keeping the best score per record, ranked descending.
fn merge_rank(a: Vec<MemoryHit>, b: Vec<MemoryHit>, limit: usize) -> Vec<MemoryHit> {
    let mut best: HashMap<uuid::Uuid, MemoryHit> = HashMap::new();
    for hit in a.into_iter().chain(b) {
        match best.get(&hit.record.id) {
            Some(current) if current.score >= hit.score => {}
            _ => {
                best.insert(hit.record.id, hit);
            }
        }
    }
    let mut merged: Vec<MemoryHit> = best.into_values().collect();
    merged.sort_by(|x, y| y.score.partial_cmp(&x.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

/// One-line numbered summary of the top hits.
fn summarize(hits: &[MemoryHit]) -> String {
    if hits.is_empty() {
        return EMPTY_SEARCH_SUMMARY.to_string();
    }
    hits.iter()
        .take(3)
        .enumerate()
        .map(|(i, hit)| format!("{}. {}", i + 1, truncate(&hit.record.text, 80)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_len.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Prompt for greeting personalization: warm, 20-40 words, references
/// prior context without overwhelming the caller.
fn build_greeting_prompt(
    profile: Option<&AgentProfile>,
    default_message: &str,
    context: &GreetingContext,
) -> String {
    let agent_name = profile.map_or("AI Assistant", |p| p.display_name.as_str());

    let last_conversation = if context.last_conversation.is_empty() {
        "None".to_string()
    } else {
        context
            .last_conversation
            .iter()
            .map(|m| format!("- {}", m.text))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let cross_agent = if context.cross_agent.is_empty() {
        "None".to_string()
    } else {
        context
            .cross_agent
            .iter()
            .map(|m| format!("- {} (importance: {})", m.text, m.importance))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Personalize the first message for a voice agent greeting a returning caller.\n\
         \n\
         Agent Info:\n\
         - Name: {agent_name}\n\
         - Default First Message: {default_message}\n\
         \n\
         Caller's Last Conversation:\n\
         {last_conversation}\n\
         \n\
         High-Priority Context from Other Interactions:\n\
         {cross_agent}\n\
         \n\
         Task: generate a warm, personalized first message (20-40 words) that:\n\
         1. Naturally acknowledges previous interactions\n\
         2. References relevant context without overwhelming the caller\n\
         3. Maintains the agent's tone and purpose\n\
         4. Feels conversational, not robotic\n\
         \n\
         Return ONLY the first message text (no JSON, no explanation)."
    )
}
