//! Policy DSL document types.
//!
//! The DSL vocabulary is closed: VAT modes, requirement operators, and
//! amount formulas are enumerations, not open strings. Adding a formula or
//! mode requires an engine change, which is the intended governance
//! boundary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::gate::GateDecision;

use super::error::PolicyError;

/// Posting side: debit or credit (Swedish convention D/K).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Debit.
    D,
    /// Credit (kredit).
    K,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::D => write!(f, "D"),
            Self::K => write!(f, "K"),
        }
    }
}

/// VAT treatment of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VatMode {
    /// Gross includes VAT; split into net and VAT.
    Standard,
    /// Gross is net; output and input VAT are computed on top.
    ReverseCharge,
    /// A per-person cap limits the deductible portion.
    Capped,
    /// Capped with the non-deductible portion posted separately.
    SplitDeductible,
}

/// Named amount formula for a posting template line.
///
/// The closed set mirrors the VAT breakdown; `net_after_cap` is an alias
/// for `deductible_net` kept for older policy documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountExpr {
    /// Total including VAT.
    Gross,
    /// Net amount.
    Net,
    /// Total VAT.
    Vat,
    /// Deductible net after the per-person cap.
    #[serde(alias = "net_after_cap")]
    DeductibleNet,
    /// Net above the per-person cap.
    NonDeductibleNet,
    /// VAT on the deductible net.
    VatDeductible,
    /// VAT above the deductible portion.
    VatNonDeductible,
    /// Output VAT under reverse charge.
    VatOutput,
    /// Input VAT under reverse charge.
    VatInput,
}

/// Requirement comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequireOp {
    /// Slot must be present.
    #[serde(rename = "exists")]
    Exists,
    /// Slot must be >= value.
    #[serde(rename = ">=")]
    Gte,
    /// Slot must be > value.
    #[serde(rename = ">")]
    Gt,
    /// Slot must be <= value.
    #[serde(rename = "<=")]
    Lte,
    /// Slot must equal value.
    #[serde(rename = "==")]
    Eq,
    /// Slot must not equal value.
    #[serde(rename = "!=")]
    Ne,
    /// Slot must be one of the listed values.
    #[serde(rename = "in")]
    In,
    /// Slot must not be one of the listed values.
    #[serde(rename = "not_in")]
    NotIn,
}

/// One required-slot predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Requirement {
    /// Slot name the predicate applies to.
    pub field: String,
    /// Comparison operator.
    pub op: RequireOp,
    /// Comparison value; absent only for `exists`.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Intent predicate deciding whether a policy applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRule {
    /// Required intent name.
    #[serde(default)]
    pub intent: Option<String>,
    /// Vendor name substrings (case-insensitive) that strengthen a match.
    #[serde(default)]
    pub vendor_patterns: Vec<String>,
    /// Minimum gross amount, inclusive.
    #[serde(default)]
    pub amount_min: Option<Decimal>,
    /// Maximum gross amount, inclusive.
    #[serde(default)]
    pub amount_max: Option<Decimal>,
}

impl MatchRule {
    /// Number of predicates this matcher constrains.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        usize::from(self.intent.is_some())
            + usize::from(!self.vendor_patterns.is_empty())
            + usize::from(self.amount_min.is_some())
            + usize::from(self.amount_max.is_some())
    }
}

/// VAT calculation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VatRule {
    /// VAT rate in percent (0-100).
    pub rate: Decimal,
    /// Net cap per attendee for deduction purposes.
    #[serde(default)]
    pub cap_per_person: Option<Decimal>,
    /// VAT code for the proposal.
    #[serde(default)]
    pub code: Option<String>,
    /// Explicit VAT mode; only `STANDARD` and `REVERSE_CHARGE` are valid
    /// in a document (capped modes are derived by the engine).
    #[serde(default)]
    pub mode: Option<VatMode>,
    /// Post the non-deductible portion separately.
    #[serde(default)]
    pub deductible_split: bool,
    /// VAT report box per amount formula (reverse charge reporting).
    #[serde(default)]
    pub report_boxes: BTreeMap<AmountExpr, String>,
}

/// One posting template line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostingTemplate {
    /// Literal account number.
    #[serde(default)]
    pub account: Option<String>,
    /// Semantic tag resolved against the catalog.
    #[serde(default)]
    pub account_ref: Option<String>,
    /// Posting side.
    pub side: Side,
    /// Amount formula.
    pub amount: AmountExpr,
    /// Line description.
    #[serde(default)]
    pub description: Option<String>,
    /// Slot names whose values are copied as line dimensions.
    #[serde(default)]
    pub dimensions: Vec<String>,
}

/// Stoplight routing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoplightRule {
    /// Outcome when required slots are missing.
    #[serde(default = "default_on_missing")]
    pub on_missing_required: GateDecision,
    /// Outcome when the rule engine reports a recoverable failure.
    #[serde(default = "default_on_fail")]
    pub on_fail: GateDecision,
    /// Minimum intent confidence for auto-booking (non-strict).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_on_missing() -> GateDecision {
    GateDecision::Clarify
}

fn default_on_fail() -> GateDecision {
    GateDecision::Park
}

fn default_confidence_threshold() -> f64 {
    0.8
}

impl Default for StoplightRule {
    fn default() -> Self {
        Self {
            on_missing_required: default_on_missing(),
            on_fail: default_on_fail(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// The rules block of a policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRules {
    /// Intent predicate.
    #[serde(rename = "match")]
    pub matcher: MatchRule,
    /// Required-slot predicates, evaluated in order.
    #[serde(default)]
    pub requires: Vec<Requirement>,
    /// VAT rules; absent means no VAT handling.
    #[serde(default)]
    pub vat: Option<VatRule>,
    /// Posting template lines, in output order.
    pub posting: Vec<PostingTemplate>,
    /// Stoplight routing.
    #[serde(default)]
    pub stoplight: StoplightRule,
}

/// A versioned policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Policy id (e.g. `SE_REPR_MEAL_V1`).
    pub id: String,
    /// Document version (e.g. `V1`).
    pub version: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// First date the policy applies to.
    pub effective_from: NaiveDate,
    /// Last date the policy applies to; open-ended when absent.
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    /// Catalog version the posting accounts refer to.
    #[serde(alias = "bas_version")]
    pub catalog_version: String,
    /// Catalog version this policy was migrated from, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,
    /// The rule block.
    pub rules: PolicyRules,
}

impl Policy {
    /// Parses a policy from a JSON document and checks the DSL schema.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Parse` for malformed JSON and
    /// `PolicyError::Invalid` for schema violations.
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        let policy: Self =
            serde_json::from_str(document).map_err(|e| PolicyError::Parse(e.to_string()))?;
        policy.check_schema()?;
        Ok(policy)
    }

    /// Validates the document-level DSL constraints.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Invalid` describing the first violation.
    pub fn check_schema(&self) -> Result<(), PolicyError> {
        let invalid = |reason: String| PolicyError::Invalid {
            id: self.id.clone(),
            reason,
        };

        if self.rules.posting.is_empty() {
            return Err(invalid("posting template cannot be empty".to_string()));
        }

        for (i, line) in self.rules.posting.iter().enumerate() {
            match (&line.account, &line.account_ref) {
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "posting line {i} sets both account and account_ref"
                    )));
                }
                (None, None) => {
                    return Err(invalid(format!(
                        "posting line {i} sets neither account nor account_ref"
                    )));
                }
                _ => {}
            }
        }

        for req in &self.rules.requires {
            if req.op != RequireOp::Exists && req.value.is_none() {
                return Err(invalid(format!(
                    "requirement on '{}' needs a value for its operator",
                    req.field
                )));
            }
        }

        if let Some(vat) = &self.rules.vat {
            if vat.rate < Decimal::ZERO || vat.rate > Decimal::ONE_HUNDRED {
                return Err(invalid(format!("vat rate out of range: {}", vat.rate)));
            }
            if let Some(cap) = vat.cap_per_person {
                if cap < Decimal::ZERO {
                    return Err(invalid(format!("vat cap cannot be negative: {cap}")));
                }
            }
            if matches!(vat.mode, Some(VatMode::Capped | VatMode::SplitDeductible)) {
                return Err(invalid(
                    "vat mode in a document must be STANDARD or REVERSE_CHARGE".to_string(),
                ));
            }
        }

        let threshold = self.rules.stoplight.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(format!(
                "confidence threshold out of range: {threshold}"
            )));
        }

        if let Some(to) = self.effective_to {
            if to < self.effective_from {
                return Err(invalid("effective_to precedes effective_from".to_string()));
            }
        }

        Ok(())
    }

    /// Returns true if the policy is effective on the given date.
    #[must_use]
    pub fn is_effective(&self, date: NaiveDate) -> bool {
        date >= self.effective_from && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Specificity for selection ordering: the number of match predicates
    /// plus requirement clauses. Narrower policies rank first.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.rules.matcher.predicate_count() + self.rules.requires.len()
    }

    /// Numeric ordinal of the version label (`V3` -> 3).
    #[must_use]
    pub fn version_ordinal(&self) -> u32 {
        self.version
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn minimal_policy() -> Policy {
        Policy {
            id: "SE_TEST_V1".to_string(),
            version: "V1".to_string(),
            country: "SE".to_string(),
            name: "Test".to_string(),
            description: None,
            effective_from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            effective_to: None,
            catalog_version: "2025_v1.0".to_string(),
            migrated_from: None,
            rules: PolicyRules {
                matcher: MatchRule {
                    intent: Some("office_supplies".to_string()),
                    ..MatchRule::default()
                },
                requires: vec![],
                vat: Some(VatRule {
                    rate: dec!(25),
                    cap_per_person: None,
                    code: None,
                    mode: None,
                    deductible_split: false,
                    report_boxes: BTreeMap::new(),
                }),
                posting: vec![
                    PostingTemplate {
                        account: Some("6110".to_string()),
                        account_ref: None,
                        side: Side::D,
                        amount: AmountExpr::Net,
                        description: None,
                        dimensions: vec![],
                    },
                    PostingTemplate {
                        account: None,
                        account_ref: Some("bank".to_string()),
                        side: Side::K,
                        amount: AmountExpr::Gross,
                        description: None,
                        dimensions: vec![],
                    },
                ],
                stoplight: StoplightRule::default(),
            },
        }
    }

    #[test]
    fn test_schema_ok() {
        assert!(minimal_policy().check_schema().is_ok());
    }

    #[test]
    fn test_schema_rejects_empty_posting() {
        let mut policy = minimal_policy();
        policy.rules.posting.clear();
        assert!(matches!(
            policy.check_schema(),
            Err(PolicyError::Invalid { .. })
        ));
    }

    #[test]
    fn test_schema_rejects_double_account() {
        let mut policy = minimal_policy();
        policy.rules.posting[0].account_ref = Some("bank".to_string());
        assert!(policy.check_schema().is_err());
    }

    #[test]
    fn test_schema_rejects_missing_requirement_value() {
        let mut policy = minimal_policy();
        policy.rules.requires.push(Requirement {
            field: "attendees_count".to_string(),
            op: RequireOp::Gte,
            value: None,
        });
        assert!(policy.check_schema().is_err());
    }

    #[test]
    fn test_schema_rejects_bad_rate() {
        let mut policy = minimal_policy();
        policy.rules.vat.as_mut().unwrap().rate = dec!(101);
        assert!(policy.check_schema().is_err());
    }

    #[test]
    fn test_schema_rejects_derived_mode_in_document() {
        let mut policy = minimal_policy();
        policy.rules.vat.as_mut().unwrap().mode = Some(VatMode::Capped);
        assert!(policy.check_schema().is_err());
    }

    #[test]
    fn test_effective_window() {
        let mut policy = minimal_policy();
        policy.effective_to = Some(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert!(policy.is_effective(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(policy.is_effective(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!policy.is_effective(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
        assert!(!policy.is_effective(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
    }

    #[test]
    fn test_specificity_counts_predicates_and_requirements() {
        let mut policy = minimal_policy();
        assert_eq!(policy.specificity(), 1);
        policy.rules.matcher.amount_max = Some(dec!(1000));
        policy.rules.requires.push(Requirement {
            field: "purpose".to_string(),
            op: RequireOp::Exists,
            value: None,
        });
        assert_eq!(policy.specificity(), 3);
    }

    #[test]
    fn test_version_ordinal() {
        let mut policy = minimal_policy();
        assert_eq!(policy.version_ordinal(), 1);
        policy.version = "V12".to_string();
        assert_eq!(policy.version_ordinal(), 12);
        policy.version = "weird".to_string();
        assert_eq!(policy.version_ordinal(), 0);
    }

    #[test]
    fn test_amount_expr_alias() {
        let expr: AmountExpr = serde_json::from_str("\"net_after_cap\"").unwrap();
        assert_eq!(expr, AmountExpr::DeductibleNet);
        let expr: AmountExpr = serde_json::from_str("\"deductible_net\"").unwrap();
        assert_eq!(expr, AmountExpr::DeductibleNet);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let doc = r#"{
            "id": "SE_TEST_V1",
            "version": "V1",
            "country": "SE",
            "name": "x",
            "effective_from": "2025-01-01",
            "catalog_version": "2025_v1.0",
            "mystery": 1,
            "rules": {"match": {}, "posting": []}
        }"#;
        assert!(matches!(Policy::from_json(doc), Err(PolicyError::Parse(_))));
    }
}
