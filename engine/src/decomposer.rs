//! Query Decomposer
//!
//! Expands one resolved query into 1-8 standalone search sub-queries. Short
//! resolved follow-ups pass through unchanged; everything else goes to the
//! completion capability, whose output is parsed tolerantly and filtered so
//! every sub-query keeps a concrete word from the source query.

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{tolerant_json, CompletionOptions, CompletionProvider, CompletionTask};
use crate::retriever::bm25::tokenize;

/// Upper bound on sub-queries
pub const MAX_SUB_QUERIES: usize = 8;

/// Resolved follow-ups up to this many characters skip decomposition
pub const PASSTHROUGH_MAX_CHARS: usize = 40;

/// Fallback sub-query length bound
const FALLBACK_MAX_CHARS: usize = 200;

/// Words that never count as the concrete part of a query
const VAGUE_WORDS: &[&str] = &[
    "best", "top", "good", "great", "cheap", "affordable", "options", "option", "deals", "deal",
    "ideas", "recommendations", "popular", "reviews", "buy", "online", "near", "new",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuery {
    Text(String),
    Object { query: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQueries {
    Wrapped {
        #[serde(alias = "subqueries", alias = "sub_queries")]
        queries: Vec<RawQuery>,
    },
    Bare(Vec<RawQuery>),
}

impl RawQueries {
    fn into_strings(self) -> Vec<String> {
        let list = match self {
            RawQueries::Wrapped { queries } => queries,
            RawQueries::Bare(queries) => queries,
        };
        list.into_iter()
            .map(|q| match q {
                RawQuery::Text(text) => text,
                RawQuery::Object { query } => query,
            })
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct QueryDecomposer {
    llm: Option<Arc<dyn CompletionProvider>>,
}

impl QueryDecomposer {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Sub-queries for `query`, never empty
    pub async fn decompose(&self, query: &str, is_follow_up_resolved: bool) -> Vec<String> {
        let query = query.trim();
        if is_follow_up_resolved && query.chars().count() <= PASSTHROUGH_MAX_CHARS {
            return vec![query.to_string()];
        }

        let Some(llm) = &self.llm else {
            return fallback(query);
        };

        let prompt = format!(
            "Rewrite the shopping or travel request below as 3 to 8 short, standalone search \
            queries that together cover what the user wants. Every query must name the \
            concrete product, place or item from the request.\n\
            Respond with only a JSON array of strings.\n\n\
            Request: {}",
            query
        );
        let options = CompletionOptions::new(CompletionTask::Decompose, 256);

        let response = match llm.complete(&prompt, &options).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Decomposition call failed, using original query: {}", e);
                return fallback(query);
            }
        };

        match tolerant_json::parse::<RawQueries>(&response) {
            Ok(raw) => {
                let queries = filter_sub_queries(query, raw.into_strings());
                if queries.is_empty() {
                    debug!("No usable sub-queries, using original query");
                    fallback(query)
                } else {
                    debug!("Decomposed into {} sub-queries", queries.len());
                    queries
                }
            }
            Err(e) => {
                warn!("Unparseable decomposition, using original query: {:#}", e);
                fallback(query)
            }
        }
    }
}

fn fallback(query: &str) -> Vec<String> {
    vec![sdk::envelope::truncate_chars(query, FALLBACK_MAX_CHARS)]
}

fn content_tokens(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| !VAGUE_WORDS.contains(&token.as_str()))
        .collect()
}

/// Drop blanks, duplicates and sub-queries without a concrete source word
fn filter_sub_queries(source: &str, candidates: Vec<String>) -> Vec<String> {
    let source_tokens = content_tokens(source);
    let mut seen = HashSet::new();

    candidates
        .into_iter()
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty())
        .filter(|q| {
            source_tokens.is_empty()
                || content_tokens(q)
                    .iter()
                    .any(|token| source_tokens.contains(token))
        })
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(MAX_SUB_QUERIES)
        .collect()
}
