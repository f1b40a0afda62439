//! Proposal construction from policy, intent, and extraction.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::catalog::AccountCatalog;
use crate::gate;
use crate::inputs::{ExtractionRecord, IntentRecord, SlotValue};
use crate::policy::{Policy, PostingTemplate, RequireOp, Requirement, Side};

use super::amounts::{compute_vat, VatBreakdown};
use super::error::EngineError;
use super::types::{PostingLine, PostingProposal};

/// Maximum debit/credit discrepancy absorbed by a rounding line.
const ROUNDING_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Description used for an automatically inserted rounding line.
const ROUNDING_DESCRIPTION: &str = "öresutjämning";

/// Interprets a JSON comparison value as a decimal.
fn json_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Stateless rule engine.
///
/// All inputs arrive as parameters and nothing is cached; the same inputs
/// always produce the same proposal.
pub struct RuleEngine;

impl RuleEngine {
    /// Produces a posting proposal for one document.
    ///
    /// Steps: match check, requirement evaluation, VAT breakdown, line
    /// generation, balance check with at most one rounding line, reason
    /// codes, and the gate decision.
    ///
    /// # Errors
    ///
    /// Returns a typed [`EngineError`]; the engine never panics on input
    /// data.
    pub fn propose(
        extraction: &ExtractionRecord,
        intent: &IntentRecord,
        policy: &Policy,
        catalog: &AccountCatalog,
    ) -> Result<PostingProposal, EngineError> {
        Self::check_match(extraction, intent, policy)?;

        let missing_required = Self::missing_requirements(&policy.rules.requires, &intent.slots);

        let stoplight = &policy.rules.stoplight;
        if !missing_required.is_empty()
            && stoplight.on_missing_required == gate::GateDecision::Park
        {
            // Parked immediately; no tentative proposal is worth computing.
            return Ok(PostingProposal {
                lines: Vec::new(),
                vat_code: policy.rules.vat.as_ref().and_then(|v| v.code.clone()),
                vat_mode: crate::policy::VatMode::Standard,
                report_boxes: BTreeMap::new(),
                confidence: intent.confidence,
                reason_codes: Self::prefix_codes(policy, intent, None),
                gate: gate::GateDecision::Park,
                policy_id: policy.id.clone(),
                missing_required,
            });
        }

        let attendees = intent
            .slots
            .get("attendees_count")
            .and_then(SlotValue::as_integer);

        let default_vat = crate::policy::VatRule {
            rate: Decimal::ZERO,
            cap_per_person: None,
            code: None,
            mode: None,
            deductible_split: false,
            report_boxes: BTreeMap::new(),
        };
        let vat_rule = policy.rules.vat.as_ref().unwrap_or(&default_vat);

        let breakdown = compute_vat(extraction.total_gross, vat_rule, attendees)?;

        let mut lines = Vec::with_capacity(policy.rules.posting.len());
        for template in &policy.rules.posting {
            if let Some(line) = Self::build_line(template, &breakdown, intent, policy, catalog)? {
                lines.push(line);
            }
        }

        let rounding_adjusted = Self::balance(&mut lines, policy, catalog)?;

        let mut report_boxes = BTreeMap::new();
        if breakdown.mode == crate::policy::VatMode::ReverseCharge {
            for (expr, box_id) in &vat_rule.report_boxes {
                report_boxes.insert(box_id.clone(), breakdown.amount_for(*expr));
            }
        }

        let mut reason_codes = Self::prefix_codes(policy, intent, Some(vat_rule));
        if breakdown.cap_applied {
            reason_codes.push("cap-applied".to_string());
        }
        if breakdown.mode == crate::policy::VatMode::ReverseCharge {
            reason_codes.push("reverse-charge".to_string());
        }
        if breakdown.mode == crate::policy::VatMode::SplitDeductible {
            reason_codes.push("split-deductible".to_string());
        }
        if let Some(old) = &policy.migrated_from {
            reason_codes.push(format!("migrated-from:{old}"));
        }
        if rounding_adjusted {
            reason_codes.push("rounding-adjusted".to_string());
        }

        let decision = gate::decide(&missing_required, false, intent.confidence, stoplight);

        Ok(PostingProposal {
            lines,
            vat_code: vat_rule.code.clone(),
            vat_mode: breakdown.mode,
            report_boxes,
            confidence: intent.confidence,
            reason_codes,
            gate: decision,
            policy_id: policy.id.clone(),
            missing_required,
        })
    }

    /// Rejects inputs the policy's match predicate excludes.
    fn check_match(
        extraction: &ExtractionRecord,
        intent: &IntentRecord,
        policy: &Policy,
    ) -> Result<(), EngineError> {
        let matcher = &policy.rules.matcher;
        let not_applicable = |reason: String| EngineError::PolicyNotApplicable {
            policy_id: policy.id.clone(),
            reason,
        };

        if let Some(required_intent) = &matcher.intent {
            if required_intent != &intent.name {
                return Err(not_applicable(format!(
                    "intent '{}' does not match '{required_intent}'",
                    intent.name
                )));
            }
        }
        if let Some(min) = matcher.amount_min {
            if extraction.total_gross < min {
                return Err(not_applicable(format!("gross below minimum {min}")));
            }
        }
        if let Some(max) = matcher.amount_max {
            if extraction.total_gross > max {
                return Err(not_applicable(format!("gross above maximum {max}")));
            }
        }

        Ok(())
    }

    /// Evaluates the `requires` predicates, returning failing fields in
    /// policy order.
    fn missing_requirements(
        requirements: &[Requirement],
        slots: &BTreeMap<String, SlotValue>,
    ) -> Vec<String> {
        let mut missing = Vec::new();
        for requirement in requirements {
            if !Self::requirement_holds(requirement, slots.get(requirement.field.as_str()))
                && !missing.contains(&requirement.field)
            {
                missing.push(requirement.field.clone());
            }
        }
        missing
    }

    /// Evaluates one predicate against an optional slot value.
    fn requirement_holds(requirement: &Requirement, actual: Option<&SlotValue>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let expected = requirement.value.as_ref();

        match requirement.op {
            RequireOp::Exists => true,
            RequireOp::Gte => Self::compare(actual, expected).is_some_and(|o| o.is_ge()),
            RequireOp::Gt => Self::compare(actual, expected).is_some_and(std::cmp::Ordering::is_gt),
            RequireOp::Lte => Self::compare(actual, expected).is_some_and(|o| o.is_le()),
            RequireOp::Eq => Self::equals(actual, expected),
            RequireOp::Ne => expected.is_some() && !Self::equals(actual, expected),
            RequireOp::In => Self::contained(actual, expected),
            RequireOp::NotIn => expected.is_some() && !Self::contained(actual, expected),
        }
    }

    /// Numeric comparison between a slot value and a JSON value.
    fn compare(
        actual: &SlotValue,
        expected: Option<&serde_json::Value>,
    ) -> Option<std::cmp::Ordering> {
        let actual = actual.as_decimal()?;
        let expected = json_decimal(expected?)?;
        Some(actual.cmp(&expected))
    }

    /// Equality between a slot value and a JSON value.
    fn equals(actual: &SlotValue, expected: Option<&serde_json::Value>) -> bool {
        let Some(expected) = expected else {
            return false;
        };
        if let (Some(a), Some(e)) = (actual.as_decimal(), json_decimal(expected)) {
            return a == e;
        }
        match (actual, expected) {
            (SlotValue::Text(a), serde_json::Value::String(e)) => a == e,
            (SlotValue::Flag(a), serde_json::Value::Bool(e)) => a == e,
            _ => false,
        }
    }

    /// Membership of a slot value in a JSON array.
    fn contained(actual: &SlotValue, expected: Option<&serde_json::Value>) -> bool {
        let Some(serde_json::Value::Array(items)) = expected else {
            return false;
        };
        items.iter().any(|item| Self::equals(actual, Some(item)))
    }

    /// Builds one posting line from a template; zero-amount lines are
    /// omitted.
    fn build_line(
        template: &PostingTemplate,
        breakdown: &VatBreakdown,
        intent: &IntentRecord,
        policy: &Policy,
        catalog: &AccountCatalog,
    ) -> Result<Option<PostingLine>, EngineError> {
        let amount = breakdown.amount_for(template.amount);
        if amount.is_zero() {
            return Ok(None);
        }
        if amount < Decimal::ZERO {
            return Err(EngineError::VatComputation {
                reason: format!("negative amount for {:?}: {amount}", template.amount),
            });
        }

        let account = match (&template.account, &template.account_ref) {
            (Some(number), _) => catalog
                .validate_account(number, &policy.country)
                .map_err(|e| EngineError::UnknownAccount {
                    reason: e.to_string(),
                })?
                .number
                .clone(),
            (None, Some(tag)) => catalog
                .resolve_tag(tag, &policy.country)
                .map_err(|e| EngineError::UnknownAccount {
                    reason: e.to_string(),
                })?
                .number
                .clone(),
            (None, None) => {
                return Err(EngineError::UnknownAccount {
                    reason: "template line names no account".to_string(),
                });
            }
        };

        let mut dimensions = BTreeMap::new();
        for slot_name in &template.dimensions {
            if let Some(value) = intent.slots.get(slot_name) {
                dimensions.insert(slot_name.clone(), value.to_string());
            }
        }

        Ok(Some(PostingLine {
            account,
            side: template.side,
            amount,
            description: template.description.clone(),
            dimensions,
        }))
    }

    /// Balances the lines, inserting at most one rounding line.
    ///
    /// Returns true if a rounding line was added.
    fn balance(
        lines: &mut Vec<PostingLine>,
        policy: &Policy,
        catalog: &AccountCatalog,
    ) -> Result<bool, EngineError> {
        if lines.is_empty() {
            return Ok(false);
        }

        let debit: Decimal = lines
            .iter()
            .filter(|l| l.side == Side::D)
            .map(|l| l.amount)
            .sum();
        let credit: Decimal = lines
            .iter()
            .filter(|l| l.side == Side::K)
            .map(|l| l.amount)
            .sum();
        let difference = debit - credit;

        if difference.is_zero() {
            return Ok(false);
        }
        if difference.abs() > ROUNDING_TOLERANCE {
            return Err(EngineError::ProposalUnbalanced { debit, credit });
        }

        let rounding_account = catalog
            .resolve_tag("rounding", &policy.country)
            .map_err(|_| EngineError::ProposalUnbalanced { debit, credit })?;

        let side = if difference > Decimal::ZERO {
            Side::K
        } else {
            Side::D
        };
        lines.push(PostingLine {
            account: rounding_account.number.clone(),
            side,
            amount: difference.abs(),
            description: Some(ROUNDING_DESCRIPTION.to_string()),
            dimensions: BTreeMap::new(),
        });

        Ok(true)
    }

    /// The leading reason codes shared by every proposal.
    fn prefix_codes(
        policy: &Policy,
        intent: &IntentRecord,
        vat_rule: Option<&crate::policy::VatRule>,
    ) -> Vec<String> {
        let mut codes = vec![
            format!("policy:{}", policy.id),
            format!("intent:{}(conf={:.2})", intent.name, intent.confidence),
        ];
        if let Some(vat) = vat_rule {
            let label = vat
                .code
                .clone()
                .unwrap_or_else(|| vat.rate.normalize().to_string());
            codes.push(format!("vat:{label}"));
        }
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::catalog::bas_2025_v1;
    use crate::gate::GateDecision;
    use crate::inputs::VatLine;
    use crate::policy::{builtin_policies, VatMode};
    use bokpilot_shared::types::Currency;

    fn extraction(gross: Decimal) -> ExtractionRecord {
        ExtractionRecord {
            total_gross: gross,
            currency: Currency::Sek,
            vat_lines: vec![],
            vendor: None,
            document_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            raw_text: None,
        }
    }

    fn intent(name: &str, confidence: f64, slots: &[(&str, SlotValue)]) -> IntentRecord {
        IntentRecord {
            name: name.to_string(),
            confidence,
            slots: slots
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }

    fn meal_policy() -> Policy {
        builtin_policies().unwrap().remove(0)
    }

    fn saas_policy() -> Policy {
        builtin_policies().unwrap().remove(1)
    }

    #[test]
    fn test_representation_meal_cap_and_split() {
        let catalog = bas_2025_v1();
        let mut record = extraction(dec!(1176.00));
        record.vat_lines = vec![VatLine {
            rate: dec!(12),
            base: dec!(1050.00),
            amount: dec!(126.00),
        }];
        let intent = intent(
            "representation_meal",
            0.96,
            &[
                ("attendees_count", SlotValue::Integer(2)),
                ("purpose", SlotValue::Text("client lunch".to_string())),
            ],
        );

        let proposal = RuleEngine::propose(&record, &intent, &meal_policy(), &catalog).unwrap();

        let expected = [
            ("6071", Side::D, dec!(600.00)),
            ("6072", Side::D, dec!(450.00)),
            ("2641", Side::D, dec!(72.00)),
            ("6072", Side::D, dec!(54.00)),
            ("1930", Side::K, dec!(1176.00)),
        ];
        assert_eq!(proposal.lines.len(), expected.len());
        for (line, (account, side, amount)) in proposal.lines.iter().zip(expected) {
            assert_eq!(line.account, account);
            assert_eq!(line.side, side);
            assert_eq!(line.amount, amount);
        }

        assert!(proposal.is_balanced());
        assert_eq!(proposal.vat_mode, VatMode::SplitDeductible);
        assert_eq!(proposal.gate, GateDecision::Auto);
        assert!(proposal.reason_codes.contains(&"cap-applied".to_string()));
        assert!(proposal
            .reason_codes
            .contains(&"split-deductible".to_string()));
        assert_eq!(proposal.reason_codes[0], "policy:SE_REPR_MEAL_V1");
        assert_eq!(
            proposal.reason_codes[1],
            "intent:representation_meal(conf=0.96)"
        );
        assert_eq!(proposal.reason_codes[2], "vat:12");
    }

    #[test]
    fn test_saas_reverse_charge() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(4500.00));
        let intent = intent(
            "saas_subscription",
            0.92,
            &[
                ("supplier_country", SlotValue::Text("IE".to_string())),
                ("service_period", SlotValue::Text("2025-10".to_string())),
            ],
        );

        let proposal = RuleEngine::propose(&record, &intent, &saas_policy(), &catalog).unwrap();

        let expected = [
            ("6540", Side::D, dec!(4500.00)),
            ("2645", Side::D, dec!(1125.00)),
            ("2614", Side::K, dec!(1125.00)),
            ("1930", Side::K, dec!(4500.00)),
        ];
        assert_eq!(proposal.lines.len(), expected.len());
        for (line, (account, side, amount)) in proposal.lines.iter().zip(expected) {
            assert_eq!(line.account, account);
            assert_eq!(line.side, side);
            assert_eq!(line.amount, amount);
        }

        assert!(proposal.is_balanced());
        assert_eq!(proposal.vat_mode, VatMode::ReverseCharge);
        assert_eq!(proposal.gate, GateDecision::Auto);
        assert!(proposal.reason_codes.contains(&"reverse-charge".to_string()));
        assert_eq!(proposal.report_boxes.get("21"), Some(&dec!(4500.00)));
        assert_eq!(proposal.report_boxes.get("30"), Some(&dec!(1125.00)));
        assert_eq!(proposal.report_boxes.get("48"), Some(&dec!(1125.00)));
    }

    #[test]
    fn test_missing_slot_yields_clarify() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(1176.00));
        let intent = intent(
            "representation_meal",
            0.95,
            &[("purpose", SlotValue::Text("client lunch".to_string()))],
        );

        let proposal = RuleEngine::propose(&record, &intent, &meal_policy(), &catalog).unwrap();
        assert_eq!(proposal.gate, GateDecision::Clarify);
        assert_eq!(proposal.missing_required, vec!["attendees_count".to_string()]);
        // Tentative proposal computed without the cap is still balanced.
        assert!(proposal.is_balanced());
    }

    #[test]
    fn test_missing_slot_with_park_policy() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(1176.00));
        let mut policy = meal_policy();
        policy.rules.stoplight.on_missing_required = GateDecision::Park;
        let intent = intent("representation_meal", 0.95, &[]);

        let proposal = RuleEngine::propose(&record, &intent, &policy, &catalog).unwrap();
        assert_eq!(proposal.gate, GateDecision::Park);
        assert!(proposal.lines.is_empty());
        assert_eq!(
            proposal.missing_required,
            vec!["attendees_count".to_string(), "purpose".to_string()]
        );
    }

    #[test]
    fn test_low_confidence_clarifies() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(1176.00));
        let intent = intent(
            "representation_meal",
            0.5,
            &[
                ("attendees_count", SlotValue::Integer(2)),
                ("purpose", SlotValue::Text("lunch".to_string())),
            ],
        );

        let proposal = RuleEngine::propose(&record, &intent, &meal_policy(), &catalog).unwrap();
        assert_eq!(proposal.gate, GateDecision::Clarify);
    }

    #[test]
    fn test_confidence_at_threshold_is_auto() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(1176.00));
        let intent = intent(
            "representation_meal",
            0.8,
            &[
                ("attendees_count", SlotValue::Integer(2)),
                ("purpose", SlotValue::Text("lunch".to_string())),
            ],
        );

        let proposal = RuleEngine::propose(&record, &intent, &meal_policy(), &catalog).unwrap();
        assert_eq!(proposal.gate, GateDecision::Auto);
    }

    #[test]
    fn test_wrong_intent_not_applicable() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(100.00));
        let intent = intent("taxi_transport", 0.9, &[]);

        let result = RuleEngine::propose(&record, &intent, &meal_policy(), &catalog);
        assert!(matches!(
            result,
            Err(EngineError::PolicyNotApplicable { .. })
        ));
    }

    #[test]
    fn test_unknown_account_fails() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(125.00));
        let mut policy = builtin_policies().unwrap().remove(2);
        policy.rules.posting[0].account = Some("9999".to_string());
        let intent = intent("office_supplies", 0.9, &[]);

        let result = RuleEngine::propose(&record, &intent, &policy, &catalog);
        assert!(matches!(result, Err(EngineError::UnknownAccount { .. })));
    }

    /// A policy that posts only the net against the gross, leaving the
    /// VAT as a deliberate gap.
    fn gap_policy(rate: Decimal) -> Policy {
        let mut policy = builtin_policies().unwrap().remove(2);
        policy.rules.vat.as_mut().unwrap().rate = rate;
        // Drop the VAT line: D net vs K gross.
        policy.rules.posting.remove(1);
        policy
    }

    #[test]
    fn test_rounding_line_absorbs_cent() {
        let catalog = bas_2025_v1();
        // 1.00 at 1%: net 0.99, gross 1.00 -> one öre gap.
        let record = extraction(dec!(1.00));
        let intent = intent("office_supplies", 0.9, &[]);

        let proposal =
            RuleEngine::propose(&record, &intent, &gap_policy(dec!(1)), &catalog).unwrap();
        assert!(proposal.is_balanced());
        let rounding_line = proposal.lines.last().unwrap();
        assert_eq!(rounding_line.account, "3740");
        assert_eq!(rounding_line.side, Side::D);
        assert_eq!(rounding_line.amount, dec!(0.01));
        assert!(proposal
            .reason_codes
            .contains(&"rounding-adjusted".to_string()));
    }

    #[test]
    fn test_gap_beyond_tolerance_is_unbalanced() {
        let catalog = bas_2025_v1();
        // 1.00 at 3%: net 0.97 -> 0.03 gap, beyond the tolerance.
        let record = extraction(dec!(1.00));
        let intent = intent("office_supplies", 0.9, &[]);

        let result = RuleEngine::propose(&record, &intent, &gap_policy(dec!(3)), &catalog);
        assert!(matches!(
            result,
            Err(EngineError::ProposalUnbalanced { .. })
        ));
    }

    #[test]
    fn test_dimensions_copied_from_slots() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(4500.00));
        let intent = intent(
            "saas_subscription",
            0.92,
            &[
                ("supplier_country", SlotValue::Text("IE".to_string())),
                ("service_period", SlotValue::Text("2025-10".to_string())),
                ("cost_center", SlotValue::Text("CC-100".to_string())),
            ],
        );

        let proposal = RuleEngine::propose(&record, &intent, &saas_policy(), &catalog).unwrap();
        assert_eq!(
            proposal.lines[0].dimensions.get("cost_center"),
            Some(&"CC-100".to_string())
        );
    }

    #[test]
    fn test_engine_is_pure() {
        let catalog = bas_2025_v1();
        let record = extraction(dec!(1176.00));
        let intent = intent(
            "representation_meal",
            0.96,
            &[
                ("attendees_count", SlotValue::Integer(2)),
                ("purpose", SlotValue::Text("client lunch".to_string())),
            ],
        );
        let policy = meal_policy();

        let first = RuleEngine::propose(&record, &intent, &policy, &catalog).unwrap();
        let second = RuleEngine::propose(&record, &intent, &policy, &catalog).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
