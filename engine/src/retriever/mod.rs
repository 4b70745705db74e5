//! Hybrid Retriever
//!
//! Ranks the raw results of one vertical:
//!
//! 1. BM25 over each candidate's text, normalized as `min(1, bm25 / 10)`
//! 2. Cosine similarity between query and candidate embeddings
//! 3. `score = bm25_weight * lexical + dense_weight * max(0, cosine)`
//! 4. Keep the top `oversample_factor * max_items`
//! 5. Optional rerank; failures keep the prior order
//! 6. Dedup by normalized name and location, keeping the higher score
//! 7. Truncate to `max_items` and emit bounded snippets
//!
//! When embedding fails the score is the lexical score alone.

pub mod bm25;
pub mod dedup;
pub mod rankable;
pub mod rerank;

pub use rankable::Rankable;
pub use rerank::{LlmReranker, RerankScore, Reranker};

use futures::future::try_join_all;
use sdk::envelope::{Capability, EnvelopeData, Snippet, MAX_SNIPPETS};
use sdk::types::{Flight, Hotel, Product, Showtime, WeatherReport};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RetrieverConfig;
use crate::llm::{cosine_similarity, EmbeddingProvider};
use crate::planner::Filters;
use bm25::Bm25Index;

/// Raw BM25 score that maps to a lexical score of 1.0
const BM25_SATURATION: f64 = 10.0;

/// Scoring weights and output bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverSettings {
    pub bm25_weight: f64,
    pub dense_weight: f64,
    pub max_items: usize,
    pub oversample_factor: usize,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            bm25_weight: 0.6,
            dense_weight: 0.4,
            max_items: 20,
            oversample_factor: 2,
        }
    }
}

impl From<&RetrieverConfig> for RetrieverSettings {
    fn from(config: &RetrieverConfig) -> Self {
        Self {
            bm25_weight: config.bm25_weight,
            dense_weight: config.dense_weight,
            max_items: config.max_items,
            oversample_factor: config.oversample_factor,
        }
    }
}

/// Domain item with its combined score in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem<T> {
    #[serde(flatten)]
    pub item: T,
    pub score: f64,
}

/// Ranked items and citation snippets for one vertical
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub items: Vec<ScoredItem<T>>,
    pub snippets: Vec<Snippet>,
}

impl<T> Ranked<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            snippets: Vec::new(),
        }
    }
}

/// Ranked result list of any vertical
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum RankedItems {
    Products(Vec<ScoredItem<Product>>),
    Hotels(Vec<ScoredItem<Hotel>>),
    Flights(Vec<ScoredItem<Flight>>),
    Showtimes(Vec<ScoredItem<Showtime>>),
    Weather(WeatherReport),
}

impl RankedItems {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Products(_) => Capability::ProductSearch,
            Self::Hotels(_) => Capability::HotelSearch,
            Self::Flights(_) => Capability::FlightSearch,
            Self::Showtimes(_) => Capability::MovieSearch,
            Self::Weather(_) => Capability::WeatherSearch,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Products(items) => items.len(),
            Self::Hotels(items) => items.len(),
            Self::Flights(items) => items.len(),
            Self::Showtimes(items) => items.len(),
            Self::Weather(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lexical + semantic ranker with optional rerank
#[derive(Clone, Default)]
pub struct HybridRetriever {
    settings: RetrieverSettings,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl HybridRetriever {
    pub fn new(settings: RetrieverSettings) -> Self {
        Self {
            settings,
            embedder: None,
            reranker: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    /// Rank the result data of one capability call
    pub async fn rank_data(
        &self,
        query: &str,
        filters: &Filters,
        data: EnvelopeData,
    ) -> (RankedItems, Vec<Snippet>) {
        match data {
            EnvelopeData::Products(items) => {
                let ranked = self.rank(query, filters, items).await;
                (RankedItems::Products(ranked.items), ranked.snippets)
            }
            EnvelopeData::Hotels(items) => {
                let ranked = self.rank(query, filters, items).await;
                (RankedItems::Hotels(ranked.items), ranked.snippets)
            }
            EnvelopeData::Flights(items) => {
                let ranked = self.rank(query, filters, items).await;
                (RankedItems::Flights(ranked.items), ranked.snippets)
            }
            EnvelopeData::Showtimes(items) => {
                let ranked = self.rank(query, filters, items).await;
                (RankedItems::Showtimes(ranked.items), ranked.snippets)
            }
            EnvelopeData::Weather(report) => {
                let snippet = weather_snippet(&report);
                (RankedItems::Weather(report), vec![snippet])
            }
        }
    }

    /// Rank candidates of one vertical against the resolved query
    pub async fn rank<T: Rankable>(
        &self,
        query: &str,
        filters: &Filters,
        candidates: Vec<T>,
    ) -> Ranked<T> {
        if candidates.is_empty() {
            return Ranked::empty();
        }

        let query_text = ranking_query(query, filters);
        let texts: Vec<String> = candidates.iter().map(Rankable::search_text).collect();

        let lexical: Vec<f64> = Bm25Index::build(&texts)
            .scores(&query_text)
            .into_iter()
            .map(|raw| (raw / BM25_SATURATION).min(1.0))
            .collect();
        let dense = self.dense_scores(&query_text, &texts).await;

        let mut scored: Vec<ScoredItem<T>> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let score = match &dense {
                    Some(dense) => {
                        self.settings.bm25_weight * lexical[i]
                            + self.settings.dense_weight * dense[i].max(0.0)
                    }
                    None => lexical[i],
                };
                ScoredItem {
                    item,
                    score: clamp_score(score),
                }
            })
            .collect();

        sort_by_score(&mut scored);
        scored.truncate(self.settings.max_items.saturating_mul(self.settings.oversample_factor));

        if let Some(reranker) = &self.reranker {
            scored = apply_rerank(reranker.as_ref(), &query_text, scored).await;
        }

        let mut items = dedup::dedup(scored);
        items.truncate(self.settings.max_items);

        let snippets = items
            .iter()
            .take(MAX_SNIPPETS)
            .map(|scored| {
                Snippet::new(
                    scored.item.item_id(),
                    scored.item.title(),
                    scored.item.url(),
                    &scored.item.excerpt(),
                    scored.score,
                )
            })
            .collect();

        Ranked { items, snippets }
    }

    /// Cosine scores per candidate, or `None` to fall back to lexical-only
    async fn dense_scores(&self, query: &str, texts: &[String]) -> Option<Vec<f64>> {
        let embedder = self.embedder.as_ref()?;

        let query_embedding = match embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("Query embedding failed, using lexical scores only: {}", e);
                return None;
            }
        };

        match try_join_all(texts.iter().map(|text| embedder.embed(text))).await {
            Ok(embeddings) => Some(
                embeddings
                    .iter()
                    .map(|embedding| cosine_similarity(&query_embedding, embedding))
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!("Candidate embedding failed, using lexical scores only: {}", e);
                None
            }
        }
    }
}

/// Resolved query plus filter terms it does not already mention
fn ranking_query(query: &str, filters: &Filters) -> String {
    let lowered = query.to_lowercase();
    let mut text = query.trim().to_string();

    let extra = [
        filters.brand.as_deref(),
        filters.category.as_deref(),
        filters.gender.as_deref(),
    ]
    .into_iter()
    .flatten()
    .chain(filters.attributes.iter().map(String::as_str));

    for term in extra {
        if !lowered.contains(&term.to_lowercase()) {
            text.push(' ');
            text.push_str(term);
        }
    }
    text
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Stable descending sort; equal scores keep provider order
fn sort_by_score<T>(items: &mut [ScoredItem<T>]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Reorder by reranker scores; unscored items follow in prior order
///
/// Unscored items are capped at the lowest reranked score so the list
/// stays sorted by score.
async fn apply_rerank<T: Rankable>(
    reranker: &dyn Reranker,
    query: &str,
    items: Vec<ScoredItem<T>>,
) -> Vec<ScoredItem<T>> {
    let texts: Vec<String> = items.iter().map(|s| s.item.search_text()).collect();

    let mut scores = match reranker.rerank(query, &texts).await {
        Ok(scores) => scores,
        Err(e) => {
            tracing::warn!("Reranker {} failed, keeping hybrid order: {:#}", reranker.name(), e);
            return items;
        }
    };
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut slots: Vec<Option<ScoredItem<T>>> = items.into_iter().map(Some).collect();
    let mut seen = HashSet::new();
    let mut ranked = Vec::with_capacity(slots.len());

    for RerankScore { index, score } in scores {
        if !seen.insert(index) {
            continue;
        }
        if let Some(mut item) = slots.get_mut(index).and_then(Option::take) {
            item.score = clamp_score(score);
            ranked.push(item);
        }
    }
    let floor = ranked.last().map(|s| s.score);
    for mut item in slots.into_iter().flatten() {
        if let Some(floor) = floor {
            item.score = item.score.min(floor);
        }
        ranked.push(item);
    }
    ranked
}

fn weather_snippet(report: &WeatherReport) -> Snippet {
    let mut excerpt = report.condition.clone();
    if let (Some(high), Some(low)) = (report.high_c, report.low_c) {
        excerpt.push_str(&format!(", high {:.0}°C, low {:.0}°C", high, low));
    } else if let Some(temp) = report.temperature_c {
        excerpt.push_str(&format!(", {:.0}°C", temp));
    }
    if let Some(chance) = report.precipitation_chance {
        excerpt.push_str(&format!(", {:.0}% chance of precipitation", chance * 100.0));
    }

    let title = match &report.date {
        Some(date) => format!("Weather in {} on {}", report.location, date),
        None => format!("Weather in {}", report.location),
    };
    let id = format!("weather-{}", report.location.to_lowercase().replace(' ', "-"));
    Snippet::new(id, title, None, &excerpt, 1.0)
}
