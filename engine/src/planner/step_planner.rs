//! Step Planner
//!
//! Decides whether a query needs a conditional multi-capability plan
//! ("check the weather, then find hotels if it's sunny") and asks the
//! completion capability to produce one.

use regex::Regex;
use sdk::envelope::Capability;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::rules::{vertical_mentions, QueryFeatures};
use super::types::{QueryContext, Step, StepPlan};
use crate::llm::{tolerant_json, CompletionOptions, CompletionProvider, CompletionTask};

/// Upper bound on steps kept from one plan
pub const MAX_STEPS: usize = 6;

struct GatePatterns {
    weather: Regex,
    conditional: Regex,
    sequential: Regex,
    trip: Regex,
}

static GATE_PATTERNS: OnceLock<Option<GatePatterns>> = OnceLock::new();

fn gate_patterns() -> Option<&'static GatePatterns> {
    GATE_PATTERNS
        .get_or_init(|| {
            let build = || -> Result<GatePatterns, regex::Error> {
                Ok(GatePatterns {
                    weather: Regex::new(
                        r"(?i)\b(weather|forecast|rain|raining|rainy|sunny|snow|snowing|temperature)\b",
                    )?,
                    conditional: Regex::new(r"(?i)\b(if|unless|depending on|in case|only when)\b")?,
                    sequential: Regex::new(
                        r"(?i)\b(then|after that|afterwards|and then|followed by|once)\b",
                    )?,
                    trip: Regex::new(
                        r"(?i)\b(trip|itinerary|vacation|getaway|travel(ing|ling)? to|visit(ing)?|weekend in|plan (a|my|our))\b",
                    )?,
                })
            };
            match build() {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    tracing::error!("Failed to compile step gate patterns: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

/// Intermediate deserialization type for LLM step output
#[derive(Debug, Deserialize)]
struct RawStep {
    id: Option<String>,
    capability: String,
    #[serde(default)]
    input: serde_json::Value,
    #[serde(default, alias = "run_if")]
    #[serde(rename = "runIf")]
    run_if: Option<String>,
    #[serde(default, alias = "condition_on_step_id")]
    #[serde(rename = "conditionOnStepId")]
    condition_on_step_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlan {
    Wrapped { steps: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDecision {
    Flag(bool),
    Object {
        #[serde(alias = "use_step_plan", alias = "multi_step", alias = "answer")]
        decision: bool,
    },
}

pub struct StepPlanner {
    llm: Arc<dyn CompletionProvider>,
}

impl StepPlanner {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// Lexical gate, without the model call
    ///
    /// Returns `Some(true)` or `Some(false)` when the cues decide, `None`
    /// for borderline trip-planning phrasing.
    pub fn lexical_gate(message: &str) -> Option<bool> {
        let Some(patterns) = gate_patterns() else {
            return Some(false);
        };
        let features = QueryFeatures::new(message);

        let weather = patterns.weather.is_match(message);
        let conditional = patterns.conditional.is_match(message);
        let sequential = patterns.sequential.is_match(message);
        let multi = vertical_mentions(&features) >= 2;

        if multi || (weather && (conditional || sequential)) {
            return Some(true);
        }
        if patterns.trip.is_match(message) {
            return None;
        }
        Some(false)
    }

    /// Whether `context` should be answered with a step plan
    ///
    /// Borderline queries cost one completion call; a failed call means no.
    pub async fn should_use_step_plan(&self, context: &QueryContext) -> bool {
        if let Some(decision) = Self::lexical_gate(&context.message) {
            return decision;
        }

        let prompt = format!(
            "Decide whether this travel request needs several searches run in order \
            (for example weather first, then hotels), or a single search.\n\
            Answer with JSON only: {{\"decision\": true}} or {{\"decision\": false}}.\n\n\
            Request: {}",
            context.message
        );
        let options = CompletionOptions::new(CompletionTask::StepGate, 16);

        match self.llm.complete(&prompt, &options).await {
            Ok(text) => parse_decision(&text),
            Err(e) => {
                warn!("Step gate classification failed: {}", e);
                false
            }
        }
    }

    /// Ask the completion capability for a step plan
    ///
    /// Returns `None` when the call fails or no step survives validation.
    pub async fn plan_steps(&self, context: &QueryContext) -> Option<StepPlan> {
        let prompt = build_plan_prompt(context);
        let options = CompletionOptions::new(CompletionTask::StepPlan, 512);

        let text = match self.llm.complete(&prompt, &options).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Step plan generation failed: {}", e);
                return None;
            }
        };

        match parse_steps(&text) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Failed to parse step plan output: {:#}", e);
                None
            }
        }
    }
}

fn build_plan_prompt(context: &QueryContext) -> String {
    let capabilities = Capability::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a search planner. Break the request into ordered search steps.\n\
        Output ONLY JSON of the form {{\"steps\": [...]}}. Each step object has:\n\
        - \"id\": unique string such as \"s1\"\n\
        - \"capability\": one of {capabilities}\n\
        - \"input\": object with the capability's fields \
        (product_search: query; hotel_search: destination, checkIn, checkOut, guests; \
        flight_search: origin, destination, departDate; movie_search: title, location; \
        weather_search: location, date)\n\
        - \"runIf\": optional condition on an earlier step's result, e.g. \"sunny\", \"rain\", \"has_results\"\n\
        - \"conditionOnStepId\": id of the earlier step that \"runIf\" refers to\n\n\
        Example:\n\
        {{\"steps\": [{{\"id\": \"s1\", \"capability\": \"weather_search\", \"input\": {{\"location\": \"Denver\", \"date\": \"this weekend\"}}}}, \
        {{\"id\": \"s2\", \"capability\": \"hotel_search\", \"input\": {{\"destination\": \"Denver\"}}, \"runIf\": \"sunny\", \"conditionOnStepId\": \"s1\"}}]}}\n\n\
        Request: {message}",
        capabilities = capabilities,
        message = context.message
    )
}

fn parse_decision(text: &str) -> bool {
    if let Ok(decision) = tolerant_json::parse::<RawDecision>(text) {
        return match decision {
            RawDecision::Flag(flag) => flag,
            RawDecision::Object { decision } => decision,
        };
    }
    let lowered = text.trim().to_lowercase();
    lowered.starts_with("yes") || lowered.starts_with("true")
}

/// Parse and validate LLM step output
///
/// Steps keep their order. A step is dropped when its capability is unknown,
/// its id repeats an earlier id, or its condition refers to a step that is
/// not an earlier kept step. A step that is not a well-formed step object is
/// dropped on its own. A `runIf` without a condition id binds to the
/// previous kept step.
fn parse_steps(text: &str) -> anyhow::Result<Option<StepPlan>> {
    let raw_steps = match tolerant_json::parse::<RawPlan>(text)? {
        RawPlan::Wrapped { steps } | RawPlan::Bare(steps) => steps,
    };

    let mut steps: Vec<Step> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, value) in raw_steps.into_iter().enumerate() {
        let raw: RawStep = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Dropping malformed step {}: {}", i + 1, e);
                continue;
            }
        };
        let Some(capability) = Capability::from_name(&raw.capability) else {
            debug!("Dropping step with unknown capability '{}'", raw.capability);
            continue;
        };

        let id = raw
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("s{}", i + 1));
        if seen.contains(&id) {
            debug!("Dropping step with duplicate id '{}'", id);
            continue;
        }

        let run_if = raw
            .run_if
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let condition_on_step_id = match (raw.condition_on_step_id, &run_if) {
            (Some(cond), _) if seen.contains(cond.trim()) => Some(cond.trim().to_string()),
            (Some(cond), _) => {
                debug!("Dropping step '{}' conditioned on unknown step '{}'", id, cond);
                continue;
            }
            (None, Some(_)) => steps.last().map(|s| s.id.clone()),
            (None, None) => None,
        };
        let run_if = if condition_on_step_id.is_some() { run_if } else { None };

        let input = if raw.input.is_object() {
            raw.input
        } else {
            serde_json::Value::Object(Default::default())
        };

        seen.insert(id.clone());
        steps.push(Step {
            id,
            capability,
            input,
            run_if,
            condition_on_step_id,
        });

        if steps.len() == MAX_STEPS {
            break;
        }
    }

    if steps.is_empty() {
        return Ok(None);
    }
    Ok(Some(StepPlan { steps }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMError, Result as LLMResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLlm {
        reply: String,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> LLMResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reply == "<error>" {
                return Err(LLMError::Timeout);
            }
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_lexical_gate() {
        assert_eq!(
            StepPlanner::lexical_gate(
                "check weather in Denver this weekend, then find hotels if it's sunny"
            ),
            Some(true)
        );
        assert_eq!(
            StepPlanner::lexical_gate("flights to Paris and hotels near the Louvre"),
            Some(true)
        );
        assert_eq!(StepPlanner::lexical_gate("weather in Denver"), Some(false));
        assert_eq!(StepPlanner::lexical_gate("cheap hotels in Austin"), Some(false));
        assert_eq!(
            StepPlanner::lexical_gate("help me plan a getaway to Miami"),
            None
        );
    }

    #[tokio::test]
    async fn test_borderline_query_uses_one_llm_call() {
        let llm = ScriptedLlm::new("```json\n{\"decision\": true}\n```");
        let planner = StepPlanner::new(llm.clone());

        let context = QueryContext::new("help me plan a getaway to Miami");
        assert!(planner.should_use_step_plan(&context).await);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

        let context = QueryContext::new("cheap hotels in Austin");
        assert!(!planner.should_use_step_plan(&context).await);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gate_llm_failure_means_no_plan() {
        let planner = StepPlanner::new(ScriptedLlm::new("<error>"));
        let context = QueryContext::new("plan my trip to Lisbon");
        assert!(!planner.should_use_step_plan(&context).await);
    }

    #[test]
    fn test_parse_decision_formats() {
        assert!(parse_decision("true"));
        assert!(parse_decision("Yes, it needs several steps."));
        assert!(parse_decision("{\"use_step_plan\": true}"));
        assert!(!parse_decision("{\"decision\": false}"));
        assert!(!parse_decision("no"));
    }

    #[test]
    fn test_parse_steps_valid_plan() {
        let text = r#"{"steps": [
            {"id": "s1", "capability": "weather_search", "input": {"location": "Denver", "date": "this weekend"}},
            {"id": "s2", "capability": "hotel_search", "input": {"destination": "Denver"}, "runIf": "sunny", "conditionOnStepId": "s1"}
        ]}"#;
        let plan = parse_steps(text).unwrap().unwrap();
        assert_eq!(
            plan.capabilities(),
            vec![Capability::WeatherSearch, Capability::HotelSearch]
        );
        assert_eq!(plan.steps[1].condition_on_step_id.as_deref(), Some("s1"));
        assert_eq!(plan.steps[1].run_if.as_deref(), Some("sunny"));
    }

    #[test]
    fn test_parse_steps_drops_invalid_steps() {
        let text = r#"[
            {"id": "a", "capability": "car_rental", "input": {}},
            {"id": "b", "capability": "weather_search", "input": {"location": "Denver"}},
            {"id": "b", "capability": "hotel_search", "input": {"destination": "Denver"}},
            {"id": "c", "capability": "hotel_search", "input": {"destination": "Denver"}, "runIf": "sunny", "conditionOnStepId": "z"},
            {"id": "d", "capability": "movie_search", "input": "Denver", "run_if": "rain"}
        ]"#;
        let plan = parse_steps(text).unwrap().unwrap();
        let ids: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);

        // runIf without a condition id binds to the previous step
        assert_eq!(plan.steps[1].condition_on_step_id.as_deref(), Some("b"));
        assert!(plan.steps[1].input.is_object());
    }

    #[test]
    fn test_malformed_step_does_not_sink_the_plan() {
        let text = r#"{"steps": [
            {"id": "s1", "capability": "weather_search", "input": {"location": "Denver"}},
            {"id": "s2", "input": {"destination": "Denver"}},
            {"id": "s3", "capability": 42},
            "search hotels",
            {"id": "s4", "capability": "hotel_search", "input": {"destination": "Denver"}, "runIf": "sunny", "conditionOnStepId": "s1"}
        ]}"#;
        let plan = parse_steps(text).unwrap().unwrap();
        let ids: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s4"]);
        assert_eq!(plan.steps[1].condition_on_step_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_parse_steps_rejects_forward_reference() {
        let text = r#"[
            {"id": "s1", "capability": "hotel_search", "input": {"destination": "Denver"}, "runIf": "sunny", "conditionOnStepId": "s2"},
            {"id": "s2", "capability": "weather_search", "input": {"location": "Denver"}}
        ]"#;
        let plan = parse_steps(text).unwrap().unwrap();
        assert_eq!(plan.capabilities(), vec![Capability::WeatherSearch]);
    }

    #[test]
    fn test_zero_valid_steps_is_no_plan() {
        let text = r#"[{"capability": "teleport", "input": {}}]"#;
        assert!(parse_steps(text).unwrap().is_none());
        assert!(parse_steps("I can't plan that").is_err());
    }

    #[tokio::test]
    async fn test_plan_steps_single_quoted_output() {
        let llm = ScriptedLlm::new(
            "Plan:\n[{'id': 's1', 'capability': 'weather_search', 'input': {'location': 'Denver'}}]",
        );
        let planner = StepPlanner::new(llm);
        let plan = planner
            .plan_steps(&QueryContext::new("weather in Denver then hotels"))
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].input["location"], "Denver");
    }
}
