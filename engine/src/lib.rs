//! Wayfind Engine Library
//!
//! Query planning, capability dispatch and hybrid retrieval for a
//! conversational shopping and travel assistant. Used by both the
//! `wayfind` binary and the integration tests.

/// Configuration management module
pub mod config;

/// LLM provider abstraction layer
pub mod llm;

/// Per-conversation session memory
pub mod session;

/// Query planner and conditional step planner
pub mod planner;

/// Query decomposition into search sub-queries
pub mod decomposer;

/// Capability dispatch with caching and failover
pub mod dispatch;

/// External search providers
pub mod providers;

/// Hybrid lexical and dense retrieval
pub mod retriever;

/// Bounded pipeline concurrency
pub mod governor;

/// End-to-end query pipeline
pub mod pipeline;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
