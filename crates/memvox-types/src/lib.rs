//! Shared domain types for Memvox.
//!
//! This crate contains the core domain types used across the Memvox
//! middleware: memory records, owner scopes, agent profiles, extraction
//! jobs, webhook event payloads, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod llm;
pub mod memory;
