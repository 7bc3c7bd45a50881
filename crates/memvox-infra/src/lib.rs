//! Infrastructure layer for Memvox.
//!
//! Contains implementations of the collaborator traits defined in
//! `memvox-core`: the external memory-service client, the voice-platform
//! identity client, the Anthropic LLM provider, and environment-based
//! configuration loading.

pub mod config;
pub mod llm;
pub mod memory_service;
pub mod platform;
