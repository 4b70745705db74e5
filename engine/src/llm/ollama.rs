//! Ollama Language Model Client
//!
//! Implements [`CompletionProvider`] over `/api/generate` and
//! [`EmbeddingProvider`] over `/api/embeddings`. Ollama runs models locally,
//! typically at http://localhost:11434, and needs no API key.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionOptions, CompletionProvider, EmbeddingProvider, LLMError, Result};
use crate::config::LLMConfig;

/// Ollama client for completion and embedding
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Completion model (e.g., "llama3.1:8b")
    model: String,

    /// Embedding model (e.g., "nomic-embed-text")
    embedding_model: String,

    /// HTTP client for API requests; `None` when it could not be built
    client: Option<Client>,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            client: match Client::builder().timeout(timeout).build() {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::error!("Failed to build Ollama HTTP client: {}", e);
                    None
                }
            },
        }
    }

    pub fn from_config(config: &LLMConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.model,
            &config.embedding_model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> LLMError {
        if e.is_timeout() {
            LLMError::Timeout
        } else if e.is_connect() {
            LLMError::ProviderUnavailable(format!(
                "Cannot connect to Ollama at {}. Is Ollama running?",
                self.base_url
            ))
        } else {
            LLMError::NetworkError(e.to_string())
        }
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let client = self.client.as_ref().ok_or_else(|| {
            LLMError::ProviderUnavailable("Ollama HTTP client unavailable".to_string())
        })?;

        let url = format!("{}{}", self.base_url, path);
        let response = client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama API error ({})",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))
    }
}

#[async_trait]
impl CompletionProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        tracing::debug!(
            "Ollama completion: model={}, task={}, prompt_chars={}",
            self.model,
            options.task,
            prompt.len()
        );

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: options.max_tokens,
                temperature: 0.0,
            },
        };

        let start = std::time::Instant::now();
        let response: GenerateResponse = self.post_json("/api/generate", &request).await?;
        tracing::debug!(
            "Ollama completion ({}) received in {:.1}s",
            options.task,
            start.elapsed().as_secs_f64()
        );

        Ok(response.response)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response: EmbeddingResponse = self.post_json("/api/embeddings", &request).await?;
        if response.embedding.is_empty() {
            return Err(LLMError::ParseError("Ollama returned an empty embedding".to_string()));
        }
        Ok(response.embedding)
    }
}

/// Ollama generate request format
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

/// Ollama generate response format
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
