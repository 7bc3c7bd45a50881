//! Transcript memory extraction via LLM.
//!
//! `MemoryExtractor` turns a call transcript into typed memory
//! candidates with a single structured-output LLM call per chunk. Long
//! transcripts are split at an estimated token budget and the chunks
//! extracted sequentially.
//!
//! Individually invalid candidates (empty text, unknown category,
//! importance outside 1-10) are dropped with a warning; a response that
//! is not parseable at all fails the whole call with `ExtractionError`,
//! which the job pipeline may retry.

use serde::Deserialize;

use memvox_types::error::ExtractionError;
use memvox_types::event::TranscriptTurn;
use memvox_types::llm::{CompletionRequest, Message, MessageRole};
use memvox_types::memory::{MemoryCandidate, OwnerScope};

use crate::llm::LlmProvider;

/// Token budget per extraction chunk (rough 4-chars-per-token estimate).
const CHUNK_TOKEN_BUDGET: usize = 10_000;

/// System prompt for the memory extraction LLM call.
///
/// Instructs the model to decompose the transcript into atomic facts
/// across the five categories with a 1-10 importance scale.
const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract memories from voice-agent call transcripts for future reference.

Extract memories in these categories:
1. FACTUAL: names (first AND last names separately), IDs, numbers, dates, locations, transactions, objective facts
2. PREFERENCE: user preferences, likes/dislikes, communication style, scheduling preferences
3. ISSUE: problems mentioned, complaints, unresolved issues, follow-up needed
4. EMOTIONAL: caller sentiment (satisfied, frustrated, neutral), tone of the interaction
5. RELATIONAL: people or entities mentioned, relationships between them

Return ONLY a JSON array (no markdown, no explanation):
[
  {
    "content": "Clear, concise, atomic memory statement",
    "category": "factual|preference|issue|emotional|relational",
    "importance": 1-10
  }
]

Rules:
- Each memory is ONE atomic fact
- Be specific and factual
- Extract BOTH first name AND last name as SEPARATE memories if both are mentioned
- If a name is spelled out (e.g., "B-R-E-E-T"), extract it as the actual name (e.g., "Breet")
- Importance: 10 = critical (account numbers, VIP status), 8-9 = names, 1 = minor detail
- Extract 5-20 memories per conversation
- If nothing is memorable, return an empty array []"#;

/// Raw candidate as returned by the LLM before validation.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    content: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    importance: i64,
}

/// Stateless utility for extracting memory candidates from a transcript.
pub struct MemoryExtractor;

impl MemoryExtractor {
    /// Extract validated memory candidates from an ordered transcript.
    ///
    /// One LLM call per chunk at temperature 0.2. The whole call fails
    /// with [`ExtractionError`] if the provider errors or a chunk's
    /// response cannot be parsed; partial candidate sets from one call
    /// are never retried piecemeal.
    #[tracing::instrument(
        name = "extract_memories",
        skip(provider, transcript),
        fields(
            scope = %scope,
            conversation_id = %conversation_id,
            turn_count = transcript.len(),
        )
    )]
    pub async fn extract<P: LlmProvider>(
        provider: &P,
        model: &str,
        transcript: &[TranscriptTurn],
        scope: &OwnerScope,
        conversation_id: &str,
    ) -> Result<Vec<MemoryCandidate>, ExtractionError> {
        if transcript.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = chunk_transcript(transcript, CHUNK_TOKEN_BUDGET);
        let mut candidates = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            tracing::debug!(
                chunk = i + 1,
                chunks = chunks.len(),
                "extracting memories from transcript chunk"
            );

            let request = CompletionRequest {
                model: model.to_string(),
                messages: vec![Message {
                    role: MessageRole::User,
                    content: format_transcript(chunk),
                }],
                system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
                max_tokens: 2048,
                temperature: Some(0.2),
                stop_sequences: None,
            };

            let response = provider.complete(&request).await?;
            let raw = parse_candidate_json(&response.content)?;
            candidates.extend(raw.into_iter().filter_map(validate_candidate));
        }

        tracing::info!(
            candidate_count = candidates.len(),
            "transcript extraction complete"
        );
        Ok(candidates)
    }
}

/// Render a transcript chunk as `role: message` lines.
fn format_transcript(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.message))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rough token estimate: ~4 characters per token.
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Split a transcript into chunks under the token budget.
///
/// A single over-budget turn still forms its own chunk rather than
/// being dropped.
fn chunk_transcript(transcript: &[TranscriptTurn], max_tokens: usize) -> Vec<Vec<TranscriptTurn>> {
    let total: usize = transcript
        .iter()
        .map(|t| estimate_tokens(&t.message) + estimate_tokens(&t.role))
        .sum();
    if total <= max_tokens {
        return vec![transcript.to_vec()];
    }

    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0;

    for turn in transcript {
        let turn_tokens = estimate_tokens(&turn.message) + estimate_tokens(&turn.role);
        if current_tokens + turn_tokens > max_tokens && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(turn.clone());
        current_tokens += turn_tokens;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Parse the model's JSON output into raw candidates.
///
/// Accepts a bare array, a fenced code block, or an object wrapping the
/// array under a `memories`/`results`/`data` key.
fn parse_candidate_json(content: &str) -> Result<Vec<RawCandidate>, ExtractionError> {
    let stripped = strip_code_fences(content.trim());

    let value: serde_json::Value = serde_json::from_str(stripped)
        .map_err(|e| ExtractionError::InvalidResponse(format!("not valid JSON: {e}")))?;

    let array = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => {
            let wrapped = ["memories", "results", "data"]
                .iter()
                .find_map(|key| map.remove(*key));
            match wrapped {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(ExtractionError::InvalidResponse(
                        "object response has no memory array".to_string(),
                    ));
                }
            }
        }
        other => {
            return Err(ExtractionError::InvalidResponse(format!(
                "unexpected JSON shape: {other}"
            )));
        }
    };

    Ok(array
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawCandidate>(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed candidate entry");
                None
            }
        })
        .collect())
}

/// Remove a surrounding markdown code fence, if present.
fn strip_code_fences(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

/// Validate one raw candidate; invalid entries are dropped, not fatal.
fn validate_candidate(raw: RawCandidate) -> Option<MemoryCandidate> {
    let text = raw.content.trim();
    if text.is_empty() {
        tracing::warn!("dropping candidate with empty text");
        return None;
    }

    let category = match raw.category.parse() {
        Ok(category) => category,
        Err(_) => {
            tracing::warn!(category = %raw.category, text = %text, "dropping candidate with unknown category");
            return None;
        }
    };

    if !(1..=10).contains(&raw.importance) {
        tracing::warn!(
            importance = raw.importance,
            text = %text,
            "dropping candidate with out-of-range importance"
        );
        return None;
    }

    Some(MemoryCandidate {
        category,
        text: text.to_string(),
        importance: raw.importance as u8,
    })
}
