//! Environment-based configuration loader.
//!
//! All runtime configuration comes from `MEMVOX_*` environment
//! variables. Policy knobs fall back to the documented defaults in
//! [`MemoryConfig`] when unset or unparseable (with a warning); the
//! webhook secret is the one hard requirement for serving.

use std::str::FromStr;

use secrecy::SecretString;

use memvox_types::config::MemoryConfig;

/// Configuration errors that prevent the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),
}

/// Full service configuration resolved from the environment.
#[derive(Clone, Debug)]
pub struct MemvoxConfig {
    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,

    /// Base URL of the external memory service.
    pub memory_api_url: String,
    /// Bearer token for the memory service, if it requires one.
    pub memory_api_key: Option<SecretString>,

    /// Base URL of the voice-platform identity API.
    pub platform_api_url: String,
    /// API key for the voice platform, if required.
    pub platform_api_key: Option<SecretString>,

    /// API key for the LLM provider.
    pub llm_api_key: Option<SecretString>,
    /// Model identifier for extraction and greeting generation.
    pub llm_model: String,
    /// Per-request LLM timeout in seconds.
    pub llm_timeout_secs: u64,

    /// Memory lifecycle policy knobs.
    pub memory: MemoryConfig,
}

impl MemvoxConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Split out from [`Self::from_env`] so tests can drive it without
    /// mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let webhook_secret = lookup("MEMVOX_WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingRequired("MEMVOX_WEBHOOK_SECRET"))?;

        let memory = MemoryConfig {
            profile_ttl_hours: parsed(&lookup, "MEMVOX_PROFILE_TTL_HOURS", 24),
            similarity_threshold: parsed(&lookup, "MEMVOX_SIMILARITY_THRESHOLD", 0.85),
            relevance_threshold: parsed(&lookup, "MEMVOX_RELEVANCE_THRESHOLD", 0.7),
            relevance_floor: parsed(&lookup, "MEMVOX_RELEVANCE_FLOOR", 0.25),
            high_importance_threshold: parsed(&lookup, "MEMVOX_HIGH_IMPORTANCE_THRESHOLD", 8),
            replay_tolerance_secs: parsed(&lookup, "MEMVOX_REPLAY_TOLERANCE_SECS", 30 * 60),
            greeting_timeout_ms: parsed(&lookup, "MEMVOX_GREETING_TIMEOUT_MS", 2_000),
            search_timeout_ms: parsed(&lookup, "MEMVOX_SEARCH_TIMEOUT_MS", 3_000),
            extract_max_attempts: parsed(&lookup, "MEMVOX_EXTRACT_MAX_ATTEMPTS", 3),
            search_limit: parsed(&lookup, "MEMVOX_SEARCH_LIMIT", 5),
            cross_agent_limit: parsed(&lookup, "MEMVOX_CROSS_AGENT_LIMIT", 5),
            queue_capacity: parsed(&lookup, "MEMVOX_QUEUE_CAPACITY", 256),
        };

        Ok(Self {
            webhook_secret,
            memory_api_url: lookup("MEMVOX_MEMORY_API_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            memory_api_key: lookup("MEMVOX_MEMORY_API_KEY")
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            platform_api_url: lookup("MEMVOX_PLATFORM_API_URL")
                .unwrap_or_else(|| "http://localhost:9090".to_string()),
            platform_api_key: lookup("MEMVOX_PLATFORM_API_KEY")
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            llm_api_key: lookup("MEMVOX_LLM_API_KEY")
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            llm_model: lookup("MEMVOX_LLM_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            llm_timeout_secs: parsed(&lookup, "MEMVOX_LLM_TIMEOUT_SECS", 30),
            memory,
        })
    }
}

/// Parse an environment value, falling back to the default on absence
/// or parse failure (the latter with a warning).
fn parsed<T: FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "unparseable value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let err = MemvoxConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(_)));
    }

    #[test]
    fn test_defaults_fill_everything_else() {
        let config =
            MemvoxConfig::from_lookup(lookup_from(&[("MEMVOX_WEBHOOK_SECRET", "whsec_x")]))
                .unwrap();
        assert_eq!(config.memory_api_url, "http://localhost:8080");
        assert!(config.memory_api_key.is_none());
        assert_eq!(config.llm_model, "claude-sonnet-4-20250514");
        assert_eq!(config.llm_timeout_secs, 30);
        assert_eq!(config.memory.profile_ttl_hours, 24);
        assert!((config.memory.relevance_threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = MemvoxConfig::from_lookup(lookup_from(&[
            ("MEMVOX_WEBHOOK_SECRET", "whsec_x"),
            ("MEMVOX_SIMILARITY_THRESHOLD", "0.9"),
            ("MEMVOX_QUEUE_CAPACITY", "64"),
            ("MEMVOX_MEMORY_API_URL", "http://memory.internal:8080"),
        ]))
        .unwrap();
        assert!((config.memory.similarity_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.memory.queue_capacity, 64);
        assert_eq!(config.memory_api_url, "http://memory.internal:8080");
    }

    #[test]
    fn test_unparseable_value_falls_back() {
        let config = MemvoxConfig::from_lookup(lookup_from(&[
            ("MEMVOX_WEBHOOK_SECRET", "whsec_x"),
            ("MEMVOX_PROFILE_TTL_HOURS", "a day"),
        ]))
        .unwrap();
        assert_eq!(config.memory.profile_ttl_hours, 24);
    }
}
