//! Language Model Abstraction Layer
//!
//! The engine consumes two capabilities from an external language model
//! service: text completion and text embedding. Both are traits so the
//! pipeline can run against Ollama in production and deterministic stubs in
//! tests.
//!
//! Completion output is never trusted to be well-formed JSON. Every caller
//! routes model output through [`tolerant_json`].

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;
pub mod tolerant_json;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::ParseError(msg) => EngineError::Parse(msg),
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// What a completion call is used for
///
/// Providers may pick a model or temperature per task; the Ollama client
/// uses it for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTask {
    /// Yes/no decision on whether a query needs a step plan
    StepGate,
    /// Step plan generation
    StepPlan,
    /// Query decomposition into sub-queries
    Decompose,
    /// Candidate reranking
    Rerank,
}

impl fmt::Display for CompletionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionTask::StepGate => write!(f, "step_gate"),
            CompletionTask::StepPlan => write!(f, "step_plan"),
            CompletionTask::Decompose => write!(f, "decompose"),
            CompletionTask::Rerank => write!(f, "rerank"),
        }
    }
}

/// Options for one completion call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOptions {
    pub task: CompletionTask,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub fn new(task: CompletionTask, max_tokens: u32) -> Self {
        Self { task, max_tokens }
    }
}

/// Text completion capability
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama")
    fn name(&self) -> &str;

    /// Complete `prompt` and return the raw model text
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

/// Text embedding capability
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama")
    fn name(&self) -> &str;

    /// Embed `text` into a dense vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cosine similarity of two vectors
///
/// Returns 0.0 for mismatched lengths or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: EngineError = LLMError::ParseError("bad".to_string()).into();
        assert!(matches!(err, EngineError::Parse(_)));

        let err: EngineError = LLMError::Timeout.into();
        assert!(matches!(err, EngineError::LLMProvider(_)));
    }

    #[test]
    fn test_completion_task_display() {
        assert_eq!(CompletionTask::StepGate.to_string(), "step_gate");
        assert_eq!(CompletionTask::Rerank.to_string(), "rerank");
    }
}
