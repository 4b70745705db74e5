//! Step plan executor
//!
//! Runs validated steps strictly in plan order. A dependent step runs only
//! after its condition step completed and its `runIf` predicate holds on
//! that step's envelope.

use sdk::envelope::{Envelope, EnvelopeData};
use tracing::{debug, info};

use crate::dispatch::CapabilityDispatcher;
use crate::planner::{Step, StepPlan};

const NEGATIONS: &[&str] = &["not", "no", "isn't", "isnt", "without", "unless"];

/// Words dropped from a predicate before matching
const PREDICATE_NOISE: &[&str] = &[
    "if", "it", "it's", "its", "is", "the", "weather", "forecast", "will", "be", "says",
    "condition", "==", "=",
];

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Completed(Envelope),
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn envelope(&self) -> Option<&Envelope> {
        match &self.status {
            StepStatus::Completed(envelope) => Some(envelope),
            StepStatus::Skipped { .. } => None,
        }
    }
}

/// Parsed `runIf` predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunIf {
    /// Condition step returned a success envelope
    Ok,
    /// Condition step failed
    Failed,
    /// Condition step succeeded with at least one item
    HasResults,
    /// Condition step succeeded with no items
    NoResults,
    /// Weather condition (e.g. "sunny"), optionally negated
    Weather { condition: String, negated: bool },
}

impl RunIf {
    pub fn parse(text: &str) -> Self {
        let lowered = text.trim().to_lowercase().replace(['\'', '"'], " ");
        let words: Vec<&str> = lowered
            .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .filter(|w| !w.is_empty())
            .collect();

        let negated = words.iter().any(|w| NEGATIONS.contains(w));
        let words: Vec<&str> = words
            .into_iter()
            .filter(|w| !NEGATIONS.contains(w) && !PREDICATE_NOISE.contains(w))
            .collect();

        match words.join("_").as_str() {
            "" | "ok" | "success" | "succeeded" | "true" => {
                if negated {
                    RunIf::Failed
                } else {
                    RunIf::Ok
                }
            }
            "failed" | "error" | "fails" => {
                if negated {
                    RunIf::Ok
                } else {
                    RunIf::Failed
                }
            }
            "has_results" | "results" | "found" | "any_results" | "available" => {
                if negated {
                    RunIf::NoResults
                } else {
                    RunIf::HasResults
                }
            }
            "no_results" | "empty" => RunIf::NoResults,
            _ => {
                let condition = words.last().copied().unwrap_or_default();
                let condition = match condition.strip_suffix("ing") {
                    Some(stem) if stem.len() >= 3 => stem,
                    _ => condition,
                };
                RunIf::Weather {
                    condition: condition.to_string(),
                    negated,
                }
            }
        }
    }

    /// Evaluate against the condition step's envelope
    pub fn holds(&self, envelope: &Envelope) -> bool {
        match self {
            RunIf::Ok => envelope.ok,
            RunIf::Failed => !envelope.ok,
            RunIf::HasResults => envelope.ok && envelope.item_count() > 0,
            RunIf::NoResults => envelope.ok && envelope.item_count() == 0,
            RunIf::Weather { condition, negated } => match &envelope.data {
                Some(EnvelopeData::Weather(report)) => {
                    report.matches_condition(condition) != *negated
                }
                // A weather predicate on non-weather data cannot be checked
                _ => false,
            },
        }
    }
}

/// Run every step in order and report what ran and what was skipped
pub async fn execute_steps(plan: &StepPlan, dispatcher: &CapabilityDispatcher) -> Vec<StepOutcome> {
    let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(plan.steps.len());

    for step in &plan.steps {
        if let Some(reason) = skip_reason(step, &outcomes) {
            info!("Skipping step {} ({}): {}", step.id, step.capability, reason);
            outcomes.push(StepOutcome {
                step: step.clone(),
                status: StepStatus::Skipped { reason },
            });
            continue;
        }

        debug!("Running step {} ({})", step.id, step.capability);
        let envelope = dispatcher.call(step.capability, &step.input).await;
        outcomes.push(StepOutcome {
            step: step.clone(),
            status: StepStatus::Completed(envelope),
        });
    }

    outcomes
}

fn skip_reason(step: &Step, earlier: &[StepOutcome]) -> Option<String> {
    let condition_id = step.condition_on_step_id.as_deref()?;

    let Some(condition) = earlier.iter().find(|o| o.step.id == condition_id) else {
        return Some(format!("condition step {} did not run before this step", condition_id));
    };
    let Some(envelope) = condition.envelope() else {
        return Some(format!("condition step {} was skipped", condition_id));
    };

    let predicate = step.run_if.as_deref().unwrap_or("ok");
    if RunIf::parse(predicate).holds(envelope) {
        None
    } else {
        Some(format!("condition \"{}\" not met by step {}", predicate, condition_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::envelope::EnvelopeError;
    use sdk::types::WeatherReport;

    fn weather(condition: &str) -> Envelope {
        Envelope::success(
            EnvelopeData::Weather(WeatherReport {
                location: "Denver".to_string(),
                condition: condition.to_string(),
                ..Default::default()
            }),
            vec![],
        )
    }

    #[test]
    fn test_parse_predicates() {
        assert_eq!(RunIf::parse("ok"), RunIf::Ok);
        assert_eq!(RunIf::parse(""), RunIf::Ok);
        assert_eq!(RunIf::parse("has_results"), RunIf::HasResults);
        assert_eq!(RunIf::parse("no results"), RunIf::NoResults);
        assert_eq!(
            RunIf::parse("if it's sunny"),
            RunIf::Weather {
                condition: "sunny".to_string(),
                negated: false
            }
        );
        assert_eq!(
            RunIf::parse("not raining"),
            RunIf::Weather {
                condition: "rain".to_string(),
                negated: true
            }
        );
    }

    #[test]
    fn test_weather_predicates() {
        assert!(RunIf::parse("sunny").holds(&weather("Sunny")));
        assert!(RunIf::parse("sunny").holds(&weather("clear skies")));
        assert!(!RunIf::parse("sunny").holds(&weather("light rain")));
        assert!(RunIf::parse("rain").holds(&weather("scattered showers")));
        assert!(RunIf::parse("not raining").holds(&weather("sunny")));
    }

    #[test]
    fn test_weather_predicate_on_failed_envelope() {
        let failed = Envelope::failure(EnvelopeError::new("timeout", "timed out", true));
        assert!(!RunIf::parse("sunny").holds(&failed));
        assert!(RunIf::parse("failed").holds(&failed));
    }

    #[test]
    fn test_result_predicates() {
        let empty = Envelope::success(EnvelopeData::Hotels(vec![]), vec![]);
        assert!(RunIf::Ok.holds(&empty));
        assert!(!RunIf::HasResults.holds(&empty));
        assert!(RunIf::NoResults.holds(&empty));
    }
}
