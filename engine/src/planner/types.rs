//! Planner data model

use sdk::envelope::Capability;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user is trying to accomplish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Decide,
    Compare,
    Choose,
    Learn,
    Locate,
    Browse,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Goal::Decide => "decide",
            Goal::Compare => "compare",
            Goal::Choose => "choose",
            Goal::Learn => "learn",
            Goal::Locate => "locate",
            Goal::Browse => "browse",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ambiguity {
    Low,
    Medium,
    High,
}

/// How the answer stage should present results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardRole {
    /// No cards; the answer is a clarification or plain text
    None,
    /// Cards back up a recommendation or comparison
    Evidence,
    /// Cards are the answer
    Options,
}

/// Card role plus the number of cards to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPolicy {
    pub role: CardRole,
    pub max_cards: usize,
}

impl CardPolicy {
    pub const NONE: CardPolicy = CardPolicy {
        role: CardRole::None,
        max_cards: 0,
    };

    pub fn for_goal(goal: Goal) -> Self {
        let (role, max_cards) = match goal {
            Goal::Decide | Goal::Compare => (CardRole::Evidence, 3),
            Goal::Choose => (CardRole::Options, 5),
            Goal::Browse => (CardRole::Options, 8),
            Goal::Learn | Goal::Locate => (CardRole::Evidence, 0),
        };
        Self { role, max_cards }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

/// How well the previous answer's results matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStrength {
    Weak,
    Strong,
}

/// Explicit user feedback on the previous answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Positive,
    Negative,
}

/// Everything the pipeline knows about one incoming query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub message: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_vertical: Option<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_result_strength: Option<ResultStrength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl QueryContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    Low,
    High,
}

/// Per-vertical filters extracted from the query and session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// City for hotels, flights (arrival), movies and weather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Free-form date phrase or ISO date (e.g. "this weekend", "2026-11-01")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guests: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

impl Filters {
    pub fn count(&self) -> usize {
        [
            self.category.is_some(),
            self.brand.is_some(),
            self.budget.is_some(),
            self.min_price.is_some(),
            self.max_price.is_some(),
            self.gender.is_some(),
            self.destination.is_some(),
            self.origin.is_some(),
            self.date.is_some(),
            self.guests.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
            + self.attributes.len()
    }
}

/// Plan that calls one capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePlan {
    pub vertical: Capability,
    pub intent: Goal,
    pub rewritten_query: String,
    pub filters: Filters,
    pub confidence: f64,
    /// The query is a follow-up that was completed from session context
    #[serde(default)]
    pub is_follow_up_resolved: bool,
}

/// One step of a conditional multi-capability plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub capability: Capability,
    pub input: serde_json::Value,
    /// Predicate on the condition step's result (e.g. "sunny", "has_results")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_on_step_id: Option<String>,
}

/// Ordered, validated step list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    pub steps: Vec<Step>,
}

impl StepPlan {
    pub fn capabilities(&self) -> Vec<Capability> {
        self.steps.iter().map(|s| s.capability).collect()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Plan {
    Single(SinglePlan),
    Steps(StepPlan),
}

impl Plan {
    pub fn as_single(&self) -> Option<&SinglePlan> {
        match self {
            Plan::Single(plan) => Some(plan),
            Plan::Steps(_) => None,
        }
    }

    pub fn as_steps(&self) -> Option<&StepPlan> {
        match self {
            Plan::Steps(plan) => Some(plan),
            Plan::Single(_) => None,
        }
    }
}

/// Planner output for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub plan: Plan,
    pub goal: Goal,
    pub ambiguity: Ambiguity,
    pub card_role: CardRole,
    pub max_cards: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
}

impl QueryPlan {
    /// Whether retrieval should be skipped in favor of the clarification
    pub fn needs_clarification(&self) -> bool {
        self.ambiguity == Ambiguity::High && self.clarification_question.is_some()
    }
}
