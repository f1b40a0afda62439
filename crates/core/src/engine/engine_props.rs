//! Property-based tests for the rule engine.
//!
//! - Every accepted proposal balances exactly.
//! - The engine is pure: identical inputs give identical proposals.
//! - VAT identities hold across the input space.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use bokpilot_shared::types::Currency;

use crate::catalog::bas_2025_v1;
use crate::inputs::{ExtractionRecord, IntentRecord, SlotValue};
use crate::policy::builtin_policies;

use super::amounts::compute_vat;
use super::engine::RuleEngine;

/// Gross amounts from 1 öre to 100,000 SEK.
fn gross_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Swedish VAT rates.
fn vat_rate() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(Decimal::ZERO),
        Just(Decimal::from(6)),
        Just(Decimal::from(12)),
        Just(Decimal::from(25)),
    ]
}

fn attendee_count() -> impl Strategy<Value = i64> {
    0i64..20
}

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

fn meal_intent(attendees: i64) -> IntentRecord {
    let mut slots = std::collections::BTreeMap::new();
    slots.insert("attendees_count".to_string(), SlotValue::Integer(attendees));
    slots.insert(
        "purpose".to_string(),
        SlotValue::Text("client meeting".to_string()),
    );
    IntentRecord {
        name: "representation_meal".to_string(),
        confidence: 0.95,
        slots,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Net plus VAT reconstructs the gross exactly for any standard split.
    #[test]
    fn prop_standard_split_identity(gross in gross_amount(), rate in vat_rate()) {
        let rule = crate::policy::VatRule {
            rate,
            cap_per_person: None,
            code: None,
            mode: None,
            deductible_split: false,
            report_boxes: std::collections::BTreeMap::new(),
        };
        let breakdown = compute_vat(gross, &rule, None).unwrap();
        prop_assert_eq!(breakdown.net + breakdown.vat, breakdown.gross);
        prop_assert!(breakdown.net >= Decimal::ZERO);
        prop_assert!(breakdown.vat >= Decimal::ZERO);
    }

    /// The capped split partitions both net and VAT without remainder.
    #[test]
    fn prop_capped_split_partitions(
        gross in gross_amount(),
        attendees in attendee_count(),
        cap in (0i64..2_000).prop_map(Decimal::from),
    ) {
        let rule = crate::policy::VatRule {
            rate: Decimal::from(12),
            cap_per_person: Some(cap),
            code: None,
            mode: None,
            deductible_split: true,
            report_boxes: std::collections::BTreeMap::new(),
        };
        let breakdown = compute_vat(gross, &rule, Some(attendees)).unwrap();
        prop_assert_eq!(
            breakdown.deductible_net + breakdown.non_deductible_net,
            breakdown.net
        );
        prop_assert_eq!(
            breakdown.vat_deductible + breakdown.vat_non_deductible,
            breakdown.vat
        );
        prop_assert!(breakdown.vat_deductible >= Decimal::ZERO);
        prop_assert!(breakdown.vat_non_deductible >= Decimal::ZERO);
    }

    /// Every proposal the engine accepts for the meal policy balances.
    #[test]
    fn prop_meal_proposals_balance(gross in gross_amount(), attendees in attendee_count()) {
        let catalog = bas_2025_v1();
        let policy = builtin_policies().unwrap().remove(0);
        let record = extraction(gross);
        let intent = meal_intent(attendees);

        if let Ok(proposal) = RuleEngine::propose(&record, &intent, &policy, &catalog) {
            prop_assert!(proposal.is_balanced(), "unbalanced for gross {gross}");
        }
    }

    /// Running the engine twice yields byte-identical proposals.
    #[test]
    fn prop_engine_is_pure(gross in gross_amount(), attendees in attendee_count()) {
        let catalog = bas_2025_v1();
        let policy = builtin_policies().unwrap().remove(0);
        let record = extraction(gross);
        let intent = meal_intent(attendees);

        let first = RuleEngine::propose(&record, &intent, &policy, &catalog);
        let second = RuleEngine::propose(&record, &intent, &policy, &catalog);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                let a = serde_json::to_vec(&a).unwrap();
                let b = serde_json::to_vec(&b).unwrap();
                prop_assert_eq!(a, b);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.error_code(), b.error_code()),
            _ => prop_assert!(false, "determinism violated"),
        }
    }

    /// Reverse charge never changes the cash amount.
    #[test]
    fn prop_reverse_charge_preserves_gross(gross in gross_amount(), rate in vat_rate()) {
        let rule = crate::policy::VatRule {
            rate,
            cap_per_person: None,
            code: None,
            mode: Some(crate::policy::VatMode::ReverseCharge),
            deductible_split: false,
            report_boxes: std::collections::BTreeMap::new(),
        };
        let breakdown = compute_vat(gross, &rule, None).unwrap();
        prop_assert_eq!(breakdown.net, breakdown.gross);
        prop_assert_eq!(breakdown.vat_output, breakdown.vat_input);
    }
}
