//! Query Planner
//!
//! Classifies the user's goal and the query's ambiguity with ordered rule
//! tables, picks the vertical and filters, and decides the card policy. When
//! a step planner is attached, qualifying queries are upgraded to a
//! conditional multi-capability plan.
//!
//! Planning never fails: the worst outcome is a `browse` plan with high
//! ambiguity and a clarification question.

pub mod rules;
pub mod step_planner;
pub mod types;

use sdk::envelope::Capability;
use tracing::debug;

use crate::session::SessionState;
use rules::{
    classify_ambiguity, classify_goal, clarification_question, detect_vertical, extract_filters,
    looks_like_follow_up, QueryFeatures,
};
pub use step_planner::StepPlanner;
pub use types::{
    Ambiguity, Budget, CardPolicy, CardRole, Feedback, Filters, Goal, Plan, QueryContext,
    QueryPlan, ResultStrength, SinglePlan, Step, StepPlan, Turn, TurnRole,
};

/// Words dropped from a follow-up before it is merged with session context
const FOLLOW_UP_NOISE: &[&str] = &[
    "what", "about", "how", "any", "show", "me", "some", "ones", "one", "those", "these", "them",
    "instead", "please", "and", "the", "other", "also", "similar", "same",
];

/// Factor applied to the previous price cap for "cheaper"
const CHEAPER_FACTOR: f64 = 0.8;

#[derive(Default)]
pub struct QueryPlanner {
    step_planner: Option<StepPlanner>,
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_planner(step_planner: StepPlanner) -> Self {
        Self {
            step_planner: Some(step_planner),
        }
    }

    /// Plan a query, consulting the step planner when one is attached
    pub async fn plan(&self, context: &QueryContext, session: Option<&SessionState>) -> QueryPlan {
        let mut query_plan = self.classify(context, session);
        if query_plan.needs_clarification() {
            return query_plan;
        }

        if let Some(step_planner) = &self.step_planner {
            if step_planner.should_use_step_plan(context).await {
                if let Some(steps) = step_planner.plan_steps(context).await {
                    debug!("Using step plan with {} steps", steps.steps.len());
                    query_plan.plan = Plan::Steps(steps);
                }
            }
        }

        query_plan
    }

    /// Rule-based single-capability plan
    pub fn classify(&self, context: &QueryContext, session: Option<&SessionState>) -> QueryPlan {
        let features = QueryFeatures::new(&context.message);
        let goal = classify_goal(&features);
        let (raw_ambiguity, raw_cue) = classify_ambiguity(&features);
        let detected = detect_vertical(&features);

        let follow_up_session = session.filter(|state| {
            features.word_count() > 0
                && (state.has_filters() || state.last_vertical.is_some())
                && (looks_like_follow_up(&features) || detected.is_none())
                && (detected.is_none() || detected == state.last_vertical)
        });

        let vertical = detected
            .or_else(|| follow_up_session.and_then(|s| s.last_vertical))
            .or(context.prior_vertical)
            .unwrap_or(Capability::ProductSearch);

        let mut filters = extract_filters(&features, vertical);
        let rewritten_query = match follow_up_session {
            Some(state) => {
                merge_session_filters(&mut filters, state, &features);
                resolve_follow_up(&features, &filters, vertical)
            }
            None => collapse_whitespace(&context.message),
        };
        let is_follow_up_resolved = follow_up_session.is_some();

        // A resolved follow-up is judged by the query it resolved to
        let (ambiguity, cue) = if is_follow_up_resolved {
            classify_ambiguity(&QueryFeatures::new(&rewritten_query))
        } else {
            (raw_ambiguity, raw_cue)
        };

        let (policy, clarification) = if ambiguity == Ambiguity::High {
            (
                CardPolicy::NONE,
                Some(clarification_question(cue, &features, detected)),
            )
        } else {
            (CardPolicy::for_goal(goal), None)
        };

        let confidence = confidence(
            ambiguity,
            detected.is_some(),
            &filters,
            is_follow_up_resolved,
            context,
        );

        debug!(
            "Planned query: goal={}, ambiguity={:?}, vertical={}, follow_up={}",
            goal, ambiguity, vertical, is_follow_up_resolved
        );

        QueryPlan {
            plan: Plan::Single(SinglePlan {
                vertical,
                intent: goal,
                rewritten_query,
                filters,
                confidence,
                is_follow_up_resolved,
            }),
            goal,
            ambiguity,
            card_role: policy.role,
            max_cards: policy.max_cards,
            clarification_question: clarification,
        }
    }
}

fn merge_session_filters(filters: &mut Filters, state: &SessionState, features: &QueryFeatures<'_>) {
    let cheaper = features.has_any(&["cheaper", "cheaper ones", "less expensive", "lower price"]);
    let pricier = features.has_any(&["more expensive", "pricier", "fancier", "nicer"]);

    filters.brand = filters.brand.take().or_else(|| state.brand.clone());
    filters.category = filters.category.take().or_else(|| state.category.clone());
    filters.gender = filters.gender.take().or_else(|| state.gender.clone());
    filters.destination = filters.destination.take().or_else(|| state.city.clone());

    if cheaper {
        filters.budget = Some(Budget::Low);
        if filters.max_price.is_none() {
            filters.max_price = state.max_price.map(|p| (p * CHEAPER_FACTOR).round());
        }
    } else if pricier {
        filters.budget = Some(Budget::High);
        if filters.min_price.is_none() {
            filters.min_price = state.max_price;
        }
    } else {
        if filters.max_price.is_none() {
            filters.max_price = state.max_price;
        }
        if filters.min_price.is_none() {
            filters.min_price = state.min_price;
        }
    }

    for attribute in &state.attributes {
        if !filters.attributes.contains(attribute) {
            filters.attributes.push(attribute.clone());
        }
    }
}

/// Standalone query for a follow-up, from its own words plus merged filters
fn resolve_follow_up(features: &QueryFeatures<'_>, filters: &Filters, vertical: Capability) -> String {
    let mut parts: Vec<String> = features
        .words
        .iter()
        .filter(|w| !FOLLOW_UP_NOISE.contains(&w.as_str()))
        .cloned()
        .collect();

    let push_missing = |parts: &mut Vec<String>, term: &str| {
        if !features.has_phrase(&term.to_lowercase()) {
            parts.push(term.to_string());
        }
    };

    if let Some(brand) = &filters.brand {
        push_missing(&mut parts, brand);
    }
    match (&filters.category, vertical_noun(vertical)) {
        (Some(category), _) => push_missing(&mut parts, category),
        (None, Some(noun)) => push_missing(&mut parts, noun),
        (None, None) => {}
    }
    if vertical != Capability::ProductSearch {
        if let Some(destination) = &filters.destination {
            if !features.has_phrase(&destination.to_lowercase()) {
                parts.push("in".to_string());
                parts.push(destination.clone());
            }
        }
    }

    parts.join(" ")
}

fn vertical_noun(vertical: Capability) -> Option<&'static str> {
    match vertical {
        Capability::ProductSearch => None,
        Capability::HotelSearch => Some("hotels"),
        Capability::FlightSearch => Some("flights"),
        Capability::MovieSearch => Some("showtimes"),
        Capability::WeatherSearch => Some("weather"),
    }
}

fn confidence(
    ambiguity: Ambiguity,
    vertical_detected: bool,
    filters: &Filters,
    follow_up: bool,
    context: &QueryContext,
) -> f64 {
    let mut score: f64 = match ambiguity {
        Ambiguity::High => return 0.2,
        Ambiguity::Medium => 0.4,
        Ambiguity::Low => 0.6,
    };
    if vertical_detected {
        score += 0.15;
    }
    score += 0.05 * filters.count().min(4) as f64;
    if follow_up {
        score += 0.05;
    }
    if context.feedback == Some(Feedback::Negative) {
        score -= 0.1;
    }
    if context.prior_result_strength == Some(ResultStrength::Weak) {
        score -= 0.05;
    }
    score.clamp(0.0, 1.0)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> QueryPlan {
        QueryPlanner::new().classify(&QueryContext::new(text), None)
    }

    fn single(plan: &QueryPlan) -> &SinglePlan {
        plan.plan.as_single().unwrap()
    }

    #[test]
    fn test_cheap_hotels_in_austin() {
        let plan = classify("cheap hotels in Austin");
        assert_eq!(plan.goal, Goal::Browse);
        assert_eq!(plan.ambiguity, Ambiguity::Low);
        assert_eq!(plan.card_role, CardRole::Options);
        assert_eq!(plan.max_cards, 8);
        assert!(plan.clarification_question.is_none());

        let single = single(&plan);
        assert_eq!(single.vertical, Capability::HotelSearch);
        assert_eq!(single.filters.destination.as_deref(), Some("Austin"));
        assert_eq!(single.filters.budget, Some(Budget::Low));
    }

    #[test]
    fn test_pronoun_query_asks_for_clarification() {
        let plan = classify("it");
        assert_eq!(plan.ambiguity, Ambiguity::High);
        assert_eq!(plan.card_role, CardRole::None);
        assert_eq!(plan.max_cards, 0);
        assert!(!plan.clarification_question.as_deref().unwrap_or("").is_empty());
        assert!(plan.needs_clarification());
    }

    #[test]
    fn test_empty_query_is_browse_high_with_clarification() {
        for text in ["", "   \t  "] {
            let plan = classify(text);
            assert_eq!(plan.goal, Goal::Browse);
            assert_eq!(plan.ambiguity, Ambiguity::High);
            assert!(plan.clarification_question.is_some());
        }
    }

    #[test]
    fn test_short_queries_override_card_policy() {
        for text in ["best laptop", "Nike vs Adidas", "should I"] {
            let plan = classify(text);
            assert_eq!(plan.ambiguity, Ambiguity::High, "{}", text);
            assert_eq!(plan.card_role, CardRole::None);
            assert_eq!(plan.max_cards, 0);
        }
    }

    #[test]
    fn test_card_policy_by_goal() {
        assert_eq!(classify("Nike Pegasus vs Adidas Ultraboost for marathon").max_cards, 3);
        assert_eq!(classify("should I buy the Sony XM5 headphones now").max_cards, 3);
        assert_eq!(classify("which running shoes are best for flat feet").max_cards, 5);
        assert_eq!(classify("what is a mirrorless Canon camera").max_cards, 0);
    }

    #[test]
    fn test_product_default_vertical() {
        let plan = classify("a warm present for my grandmother this winter");
        assert_eq!(single(&plan).vertical, Capability::ProductSearch);
    }

    #[test]
    fn test_follow_up_merges_session_filters() {
        let session = SessionState {
            last_vertical: Some(Capability::ProductSearch),
            brand: Some("Nike".to_string()),
            category: Some("running shoes".to_string()),
            max_price: Some(150.0),
            ..SessionState::new()
        };
        let plan = QueryPlanner::new().classify(&QueryContext::new("cheaper ones"), Some(&session));

        assert_eq!(plan.ambiguity, Ambiguity::Low);
        assert!(plan.clarification_question.is_none());
        let single = single(&plan);
        assert!(single.is_follow_up_resolved);
        assert_eq!(single.vertical, Capability::ProductSearch);
        assert_eq!(single.filters.brand.as_deref(), Some("Nike"));
        assert_eq!(single.filters.max_price, Some(120.0));
        assert_eq!(single.rewritten_query, "cheaper Nike running shoes");
    }

    #[test]
    fn test_short_resolved_follow_up_stays_high() {
        // Nothing in the session to fill out the query
        let session = SessionState {
            last_vertical: Some(Capability::ProductSearch),
            ..SessionState::new()
        };
        let plan = QueryPlanner::new().classify(&QueryContext::new("cheaper ones"), Some(&session));

        let single = single(&plan);
        assert!(single.is_follow_up_resolved);
        assert_eq!(single.rewritten_query, "cheaper");
        assert_eq!(plan.ambiguity, Ambiguity::High);
        assert_eq!(plan.card_role, CardRole::None);
        assert_eq!(plan.max_cards, 0);
        assert!(plan.clarification_question.is_some());
    }

    #[test]
    fn test_follow_up_keeps_hotel_city() {
        let session = SessionState {
            last_vertical: Some(Capability::HotelSearch),
            city: Some("Austin".to_string()),
            ..SessionState::new()
        };
        let plan = QueryPlanner::new().classify(
            &QueryContext::new("any with a pool under $200"),
            Some(&session),
        );
        let single = single(&plan);
        assert_eq!(single.vertical, Capability::HotelSearch);
        assert_eq!(single.filters.destination.as_deref(), Some("Austin"));
        assert_eq!(single.filters.max_price, Some(200.0));
        assert!(single.rewritten_query.contains("hotels in Austin"));
    }

    #[test]
    fn test_new_vertical_ignores_session() {
        let session = SessionState {
            last_vertical: Some(Capability::ProductSearch),
            brand: Some("Nike".to_string()),
            ..SessionState::new()
        };
        let plan = QueryPlanner::new().classify(
            &QueryContext::new("cheap hotels in Austin"),
            Some(&session),
        );
        let single = single(&plan);
        assert!(!single.is_follow_up_resolved);
        assert_eq!(single.filters.brand, None);
    }

    #[test]
    fn test_confidence_bounded() {
        for text in ["", "it", "cheap hotels in Austin for 2 guests this weekend under $200"] {
            let plan = classify(text);
            let confidence = single(&plan).confidence;
            assert!((0.0..=1.0).contains(&confidence));
        }
    }

    #[tokio::test]
    async fn test_plan_without_step_planner_is_single() {
        let plan = QueryPlanner::new()
            .plan(
                &QueryContext::new(
                    "check weather in Denver this weekend, then find hotels if it's sunny",
                ),
                None,
            )
            .await;
        assert!(plan.plan.as_single().is_some());
    }
}
