//! Learned reranking
//!
//! A [`Reranker`] scores candidate texts against the query. The retriever
//! treats any failure as "keep the prior order".

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::llm::tolerant_json;
use crate::llm::{CompletionOptions, CompletionProvider, CompletionTask};

/// Candidate texts longer than this are cut before prompting
const MAX_TEXT_CHARS: usize = 240;

/// Relevance score for one candidate, by position in the input
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f64,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Score `texts` against `query`; omitted indices keep their prior place
    async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<RerankScore>>;
}

/// Reranker backed by the completion capability
pub struct LlmReranker {
    llm: Arc<dyn CompletionProvider>,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    fn build_prompt(query: &str, texts: &[String]) -> String {
        let mut prompt = String::from(
            "Score how well each candidate matches the search query, from 0.0 (irrelevant) \
             to 1.0 (exact match).\n\
             Respond with only a JSON array like [{\"index\": 0, \"score\": 0.9}].\n\n",
        );
        prompt.push_str(&format!("Query: {}\n\nCandidates:\n", query));
        for (i, text) in texts.iter().enumerate() {
            let text = sdk::envelope::truncate_chars(text, MAX_TEXT_CHARS);
            prompt.push_str(&format!("{}. {}\n", i, text));
        }
        prompt
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    fn name(&self) -> &str {
        "llm"
    }

    async fn rerank(&self, query: &str, texts: &[String]) -> Result<Vec<RerankScore>> {
        let prompt = Self::build_prompt(query, texts);
        let max_tokens = (texts.len() as u32 * 16).clamp(64, 1024);
        let options = CompletionOptions::new(CompletionTask::Rerank, max_tokens);

        let response = self
            .llm
            .complete(&prompt, &options)
            .await
            .context("rerank completion failed")?;

        let scores: Vec<RerankScore> =
            tolerant_json::parse(&response).context("rerank response is not a score list")?;

        Ok(scores
            .into_iter()
            .filter(|s| s.index < texts.len() && s.score.is_finite())
            .map(|s| RerankScore {
                index: s.index,
                score: s.score.clamp(0.0, 1.0),
            })
            .collect())
    }
}
