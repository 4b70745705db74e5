//! Query pipeline
//!
//! Entry point tying the components together for one query:
//!
//! ```text
//! QueryContext -> governor -> planner (+ session) -> decomposer
//!              -> dispatch -> hybrid retriever -> PipelineOutput
//! ```
//!
//! The session is updated only after every call has finished, so a
//! cancelled run leaves session memory untouched.

pub mod executor;

pub use executor::{execute_steps, RunIf, StepOutcome, StepStatus};

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use sdk::envelope::{Capability, Envelope, EnvelopeData, EnvelopeError, Snippet, MAX_SNIPPETS};
use sdk::errors::EngineError;
use sdk::types::CapabilityRequest;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::decomposer::QueryDecomposer;
use crate::dispatch::CapabilityDispatcher;
use crate::governor::ConcurrencyGovernor;
use crate::llm::ollama::OllamaClient;
use crate::llm::CompletionProvider;
use crate::planner::{
    Ambiguity, Filters, Plan, QueryContext, QueryPlan, QueryPlanner, SinglePlan, StepPlan,
    StepPlanner,
};
use crate::providers::SerpApiProvider;
use crate::retriever::{HybridRetriever, LlmReranker, RankedItems, RetrieverSettings};
use crate::session::{InMemorySessionStore, SessionState, SessionStore};

/// Result of one pipeline run, handed to the answer stage
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub request_id: String,
    pub plan: QueryPlan,
    pub sub_queries: Vec<String>,
    pub ranked_items_by_vertical: BTreeMap<Capability, RankedItems>,
    pub snippets: Vec<Snippet>,
    pub ambiguity: Ambiguity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    /// Capabilities that returned no usable data
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<Capability, EnvelopeError>,
    /// Step ids not run because their condition failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_steps: Vec<String>,
}

/// Everything a pipeline needs, injected by the caller
pub struct PipelineComponents {
    pub planner: QueryPlanner,
    pub decomposer: QueryDecomposer,
    pub dispatcher: Arc<CapabilityDispatcher>,
    pub retriever: HybridRetriever,
    pub sessions: Arc<dyn SessionStore>,
    pub governor: ConcurrencyGovernor,
}

pub struct Pipeline {
    planner: QueryPlanner,
    decomposer: QueryDecomposer,
    dispatcher: Arc<CapabilityDispatcher>,
    retriever: HybridRetriever,
    sessions: Arc<dyn SessionStore>,
    governor: ConcurrencyGovernor,
}

/// Merged data and ranking context for one vertical
struct VerticalResult {
    capability: Capability,
    query: String,
    filters: Filters,
    data: Option<EnvelopeData>,
    error: Option<EnvelopeError>,
}

impl Pipeline {
    pub fn new(components: PipelineComponents) -> Self {
        Self {
            planner: components.planner,
            decomposer: components.decomposer,
            dispatcher: components.dispatcher,
            retriever: components.retriever,
            sessions: components.sessions,
            governor: components.governor,
        }
    }

    /// Production wiring: Ollama for the model, SerpAPI for search
    ///
    /// Returns the in-memory session store too, so the caller can run its
    /// sweeper.
    pub fn from_config(config: &Config) -> (Self, Arc<InMemorySessionStore>) {
        let ollama = Arc::new(OllamaClient::from_config(&config.llm));
        let completion: Arc<dyn CompletionProvider> = ollama.clone();

        let mut dispatcher = CapabilityDispatcher::from_config(&config.dispatch);
        dispatcher.register(Arc::new(SerpApiProvider::from_config(
            &config.providers.serpapi,
            config.dispatch.provider_timeout(),
        )));

        let mut retriever =
            HybridRetriever::new(RetrieverSettings::from(&config.retriever)).with_embedder(ollama);
        if config.retriever.rerank_enabled {
            retriever = retriever.with_reranker(Arc::new(LlmReranker::new(completion.clone())));
        }

        let sessions = Arc::new(InMemorySessionStore::from_config(&config.session));
        let pipeline = Self::new(PipelineComponents {
            planner: QueryPlanner::with_step_planner(StepPlanner::new(completion.clone())),
            decomposer: QueryDecomposer::new(completion),
            dispatcher: Arc::new(dispatcher),
            retriever,
            sessions: sessions.clone(),
            governor: ConcurrencyGovernor::from_config(&config.governor),
        });
        (pipeline, sessions)
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    /// Plan only, without retrieval
    pub async fn plan(&self, context: &QueryContext) -> QueryPlan {
        let session = self.load_session(context);
        self.planner.plan(context, session.as_ref()).await
    }

    /// Run the full pipeline under admission control
    ///
    /// # Errors
    ///
    /// `Backpressure` when the governor queue is full, `Cancelled` when
    /// `cancel` fires first, `GovernorClosed` during shutdown.
    pub async fn run(
        &self,
        context: &QueryContext,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput, EngineError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("pipeline", request_id = %request_id);
        let work = self.execute(context, request_id).instrument(span);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Pipeline cancelled");
                Err(EngineError::Cancelled)
            }
            result = self.governor.submit(work) => result,
        }
    }

    async fn execute(&self, context: &QueryContext, request_id: String) -> PipelineOutput {
        let session = self.load_session(context);
        let plan = self.planner.plan(context, session.as_ref()).await;

        let mut output = PipelineOutput {
            request_id,
            ambiguity: plan.ambiguity,
            clarification_question: plan.clarification_question.clone(),
            plan,
            sub_queries: Vec::new(),
            ranked_items_by_vertical: BTreeMap::new(),
            snippets: Vec::new(),
            failures: BTreeMap::new(),
            skipped_steps: Vec::new(),
        };

        if output.plan.needs_clarification() {
            info!("Query needs clarification, skipping retrieval");
            return output;
        }

        let verticals = match &output.plan.plan {
            Plan::Single(single) => {
                let sub_queries = self
                    .decomposer
                    .decompose(&single.rewritten_query, single.is_follow_up_resolved)
                    .await;
                let result = self.run_single(single, &sub_queries).await;
                output.sub_queries = sub_queries;
                vec![result]
            }
            Plan::Steps(steps) => {
                let (results, skipped) = self.run_steps(steps).await;
                output.skipped_steps = skipped;
                results
            }
        };

        let mut snippets = Vec::new();
        for vertical in verticals {
            if let Some(error) = vertical.error {
                output.failures.insert(vertical.capability, error);
            }
            let Some(data) = vertical.data else {
                continue;
            };
            let (ranked, vertical_snippets) = self
                .retriever
                .rank_data(&vertical.query, &vertical.filters, data)
                .await;
            debug!("Ranked {} items for {}", ranked.len(), vertical.capability);
            snippets.extend(vertical_snippets);
            output
                .ranked_items_by_vertical
                .insert(vertical.capability, ranked);
        }

        snippets.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        snippets.truncate(MAX_SNIPPETS);
        output.snippets = snippets;

        if let Some(session_id) = &context.session_id {
            let state = next_session_state(session, &output);
            self.sessions.set(session_id, state);
        }

        info!(
            "Pipeline finished: {} verticals, {} snippets, {} failures",
            output.ranked_items_by_vertical.len(),
            output.snippets.len(),
            output.failures.len()
        );
        output
    }

    fn load_session(&self, context: &QueryContext) -> Option<SessionState> {
        context
            .session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
    }

    /// One capability, one call per sub-query, results merged
    async fn run_single(&self, plan: &SinglePlan, sub_queries: &[String]) -> VerticalResult {
        let inputs: Vec<Value> = sub_queries
            .iter()
            .map(|q| capability_input(plan.vertical, q, &plan.filters))
            .collect();

        let envelopes = join_all(
            inputs
                .iter()
                .map(|input| self.dispatcher.call(plan.vertical, input)),
        )
        .await;

        let (data, error) = merge_envelopes(envelopes);
        VerticalResult {
            capability: plan.vertical,
            query: plan.rewritten_query.clone(),
            filters: plan.filters.clone(),
            data,
            error,
        }
    }

    async fn run_steps(&self, plan: &StepPlan) -> (Vec<VerticalResult>, Vec<String>) {
        let outcomes = execute_steps(plan, &self.dispatcher).await;

        let mut skipped = Vec::new();
        let mut by_capability: BTreeMap<Capability, (String, Vec<Envelope>)> = BTreeMap::new();

        for outcome in outcomes {
            match outcome.status {
                StepStatus::Skipped { .. } => skipped.push(outcome.step.id),
                StepStatus::Completed(envelope) => {
                    let query = CapabilityRequest::parse(outcome.step.capability, &outcome.step.input)
                        .map(|request| request.search_text())
                        .unwrap_or_default();
                    let entry = by_capability
                        .entry(outcome.step.capability)
                        .or_insert_with(|| (query, Vec::new()));
                    entry.1.push(envelope);
                }
            }
        }

        let results = by_capability
            .into_iter()
            .map(|(capability, (query, envelopes))| {
                let (data, error) = merge_envelopes(envelopes);
                VerticalResult {
                    capability,
                    query,
                    filters: Filters::default(),
                    data,
                    error,
                }
            })
            .collect();

        (results, skipped)
    }
}

/// Merge successful data; report the first error only when nothing succeeded
fn merge_envelopes(envelopes: Vec<Envelope>) -> (Option<EnvelopeData>, Option<EnvelopeError>) {
    let mut merged: Option<EnvelopeData> = None;
    let mut first_error = None;

    for envelope in envelopes {
        match (envelope.data, envelope.error) {
            (Some(data), _) => match &mut merged {
                Some(existing) => {
                    if !existing.merge(data) {
                        warn!("Dropped result set with mismatched shape");
                    }
                }
                None => merged = Some(data),
            },
            (None, Some(error)) => {
                first_error.get_or_insert(error);
            }
            (None, None) => {}
        }
    }

    match merged {
        Some(data) => (Some(data), None),
        None => (None, first_error),
    }
}

/// ISO date from a free-form date phrase, if it is one
fn iso_date(date: Option<&str>) -> Option<String> {
    let date = date?.trim();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Structured capability input for one sub-query
fn capability_input(capability: Capability, query: &str, filters: &Filters) -> Value {
    let mut input = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            input.insert(key.to_string(), value);
        }
    };
    let text = |s: &Option<String>| s.as_ref().map(|s| json!(s));
    let date = iso_date(filters.date.as_deref()).map(Value::String);

    match capability {
        Capability::ProductSearch => {
            put("query", Some(json!(query)));
            put("brand", text(&filters.brand));
            put("category", text(&filters.category));
            put("minPrice", filters.min_price.map(|p| json!(p)));
            put("maxPrice", filters.max_price.map(|p| json!(p)));
            put("gender", text(&filters.gender));
        }
        Capability::HotelSearch => {
            // Missing destination is left out and rejected by dispatch
            put("destination", text(&filters.destination));
            put("query", Some(json!(query)));
            put("guests", filters.guests.map(|g| json!(g)));
            put("maxPrice", filters.max_price.map(|p| json!(p)));
            put("checkIn", date);
        }
        Capability::FlightSearch => {
            put("origin", text(&filters.origin));
            put("destination", text(&filters.destination));
            put("departDate", date);
            put("passengers", filters.guests.map(|g| json!(g)));
        }
        Capability::MovieSearch => {
            put("location", text(&filters.destination));
            put("date", date);
        }
        Capability::WeatherSearch => {
            put("location", text(&filters.destination));
            put("date", date.or_else(|| text(&filters.date)));
        }
    }

    Value::Object(input)
}

/// Session state after a run: previous state overlaid with this run's filters
fn next_session_state(previous: Option<SessionState>, output: &PipelineOutput) -> SessionState {
    let mut state = previous.unwrap_or_default();
    state.updated_at = Utc::now();

    match &output.plan.plan {
        Plan::Single(single) => {
            let filters = &single.filters;
            state.last_vertical = Some(single.vertical);
            if filters.brand.is_some() {
                state.brand = filters.brand.clone();
            }
            if filters.category.is_some() {
                state.category = filters.category.clone();
            }
            if filters.min_price.is_some() {
                state.min_price = filters.min_price;
            }
            if filters.max_price.is_some() {
                state.max_price = filters.max_price;
            }
            if filters.destination.is_some() {
                state.city = filters.destination.clone();
            }
            if filters.gender.is_some() {
                state.gender = filters.gender.clone();
            }
            state.attributes.extend(filters.attributes.iter().cloned());
        }
        Plan::Steps(steps) => {
            let ran = steps
                .steps
                .iter()
                .filter(|step| !output.skipped_steps.contains(&step.id));
            for step in ran {
                state.last_vertical = Some(step.capability);
                let city = ["destination", "location"]
                    .iter()
                    .find_map(|key| step.input.get(*key).and_then(Value::as_str));
                if let Some(city) = city {
                    state.city = Some(city.to_string());
                }
            }
        }
    }

    state
}
