//! Observability setup for Memvox.

pub mod tracing_setup;
