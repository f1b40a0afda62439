//! Stoplight gate: the tri-state decision over a posting proposal.
//!
//! The gate maps (completeness, rule outcome, intent confidence) to one of
//! three outcomes: auto-book, hold for one clarifying question, or park for
//! manual review. Internally these correspond to the green/yellow/red
//! stoplight of the policy DSL.

use serde::{Deserialize, Serialize};

use crate::policy::StoplightRule;

/// Gate outcome for a posting proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    /// Green: post the proposal without human interaction.
    Auto,
    /// Yellow: hold the run and ask exactly one clarifying question.
    Clarify,
    /// Red: park the run for manual review.
    Park,
}

impl GateDecision {
    /// Returns the string representation of the decision.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Clarify => "CLARIFY",
            Self::Park => "PARK",
        }
    }

    /// Parses a decision from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AUTO" => Some(Self::Auto),
            "CLARIFY" => Some(Self::Clarify),
            "PARK" => Some(Self::Park),
            _ => None,
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single structured clarification question.
///
/// Derived deterministically so the same input always yields the same
/// question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyQuestion {
    /// The slot the answer should fill, when the question targets one.
    pub slot: Option<String>,
    /// Human-readable question text.
    pub text: String,
}

/// Decides the gate outcome for a proposal.
///
/// Rules, in order:
/// 1. Missing required slots route to the policy's `on_missing_required`.
/// 2. A recoverable rule-engine failure routes to the policy's `on_fail`.
/// 3. Confidence below the threshold routes to `CLARIFY` (the comparison
///    is non-strict: confidence equal to the threshold passes).
/// 4. Otherwise `AUTO`.
#[must_use]
pub fn decide(
    missing_required: &[String],
    engine_failed: bool,
    confidence: f64,
    stoplight: &StoplightRule,
) -> GateDecision {
    if !missing_required.is_empty() {
        return stoplight.on_missing_required;
    }
    if engine_failed {
        return stoplight.on_fail;
    }
    if confidence < stoplight.confidence_threshold {
        return GateDecision::Clarify;
    }
    GateDecision::Auto
}

/// Builds the clarification question for a `CLARIFY` outcome.
///
/// The question targets the first missing required slot; with no missing
/// slots the question is a low-confidence confirmation of the intent.
#[must_use]
pub fn question_for(missing_required: &[String], intent_name: &str) -> ClarifyQuestion {
    match missing_required.first() {
        Some(slot) => ClarifyQuestion {
            slot: Some(slot.clone()),
            text: slot_question(slot),
        },
        None => ClarifyQuestion {
            slot: None,
            text: format!("Please confirm that this transaction is a '{intent_name}'."),
        },
    }
}

fn slot_question(slot: &str) -> String {
    match slot {
        "attendees_count" => "How many people attended?".to_string(),
        "purpose" => "What was the business purpose?".to_string(),
        "supplier_country" => "Which country is the supplier based in?".to_string(),
        "service_period" => "Which period does the service cover?".to_string(),
        "installment_months" => "Over how many months is this paid?".to_string(),
        other => format!("Please provide a value for '{other}'."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stoplight() -> StoplightRule {
        StoplightRule {
            on_missing_required: GateDecision::Clarify,
            on_fail: GateDecision::Park,
            confidence_threshold: 0.8,
        }
    }

    #[test]
    fn test_auto_when_complete_and_confident() {
        let decision = decide(&[], false, 0.95, &stoplight());
        assert_eq!(decision, GateDecision::Auto);
    }

    #[test]
    fn test_threshold_is_non_strict() {
        let decision = decide(&[], false, 0.8, &stoplight());
        assert_eq!(decision, GateDecision::Auto);
    }

    #[test]
    fn test_below_threshold_clarifies() {
        let decision = decide(&[], false, 0.79, &stoplight());
        assert_eq!(decision, GateDecision::Clarify);
    }

    #[test]
    fn test_missing_required_routes_to_policy() {
        let missing = vec!["attendees_count".to_string()];
        assert_eq!(
            decide(&missing, false, 0.99, &stoplight()),
            GateDecision::Clarify
        );

        let mut park_on_missing = stoplight();
        park_on_missing.on_missing_required = GateDecision::Park;
        assert_eq!(
            decide(&missing, false, 0.99, &park_on_missing),
            GateDecision::Park
        );
    }

    #[test]
    fn test_engine_failure_routes_to_on_fail() {
        assert_eq!(decide(&[], true, 0.99, &stoplight()), GateDecision::Park);
    }

    #[test]
    fn test_missing_takes_precedence_over_failure() {
        let missing = vec!["purpose".to_string()];
        assert_eq!(
            decide(&missing, true, 0.99, &stoplight()),
            GateDecision::Clarify
        );
    }

    #[test]
    fn test_question_is_deterministic() {
        let missing = vec!["attendees_count".to_string(), "purpose".to_string()];
        let q1 = question_for(&missing, "representation_meal");
        let q2 = question_for(&missing, "representation_meal");
        assert_eq!(q1, q2);
        assert_eq!(q1.slot.as_deref(), Some("attendees_count"));
        assert_eq!(q1.text, "How many people attended?");
    }

    #[test]
    fn test_low_confidence_question() {
        let q = question_for(&[], "saas_subscription");
        assert!(q.slot.is_none());
        assert!(q.text.contains("saas_subscription"));
    }

    #[test]
    fn test_decision_parse_roundtrip() {
        for d in [GateDecision::Auto, GateDecision::Clarify, GateDecision::Park] {
            assert_eq!(GateDecision::parse(d.as_str()), Some(d));
        }
        assert_eq!(GateDecision::parse("GREEN"), None);
    }
}
