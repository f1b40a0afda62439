//! Built-in policy documents.
//!
//! These JSON documents double as seed data and as executable examples of
//! the DSL. They are parsed through the same loader as documents coming
//! from data files or repository rows.

use super::error::PolicyError;
use super::types::Policy;

/// Swedish representation meal: 12% VAT, 300 SEK net cap per attendee,
/// deductible split with the non-deductible VAT carried as cost.
pub const SE_REPR_MEAL_V1: &str = r#"{
    "id": "SE_REPR_MEAL_V1",
    "version": "V1",
    "country": "SE",
    "name": "Representation meal (SE)",
    "description": "Client representation meals with per-person deduction cap",
    "effective_from": "2025-01-01",
    "catalog_version": "2025_v1.0",
    "rules": {
        "match": {
            "intent": "representation_meal"
        },
        "requires": [
            {"field": "attendees_count", "op": ">=", "value": 1},
            {"field": "purpose", "op": "exists"}
        ],
        "vat": {
            "rate": 12,
            "cap_per_person": 300,
            "code": "12",
            "deductible_split": true
        },
        "posting": [
            {"account": "6071", "side": "D", "amount": "deductible_net", "description": "deductible net"},
            {"account": "6072", "side": "D", "amount": "non_deductible_net", "description": "non-deductible net"},
            {"account": "2641", "side": "D", "amount": "vat_deductible", "description": "deductible VAT"},
            {"account": "6072", "side": "D", "amount": "vat_non_deductible", "description": "non-deductible VAT"},
            {"account_ref": "bank", "side": "K", "amount": "gross", "description": "bank"}
        ],
        "stoplight": {
            "on_missing_required": "CLARIFY",
            "on_fail": "PARK",
            "confidence_threshold": 0.8
        }
    }
}"#;

/// SaaS subscription from an EU supplier: 25% reverse-charge VAT.
pub const SE_SAAS_REVERSE_V1: &str = r#"{
    "id": "SE_SAAS_REVERSE_V1",
    "version": "V1",
    "country": "SE",
    "name": "SaaS subscription, EU reverse charge (SE)",
    "effective_from": "2025-01-01",
    "catalog_version": "2025_v1.0",
    "rules": {
        "match": {
            "intent": "saas_subscription"
        },
        "requires": [
            {"field": "supplier_country", "op": "exists"},
            {"field": "service_period", "op": "exists"}
        ],
        "vat": {
            "rate": 25,
            "mode": "REVERSE_CHARGE",
            "code": "RC25",
            "report_boxes": {
                "net": "21",
                "vat_output": "30",
                "vat_input": "48"
            }
        },
        "posting": [
            {"account": "6540", "side": "D", "amount": "net", "description": "service cost", "dimensions": ["cost_center"]},
            {"account": "2645", "side": "D", "amount": "vat_input", "description": "input VAT"},
            {"account": "2614", "side": "K", "amount": "vat_output", "description": "output VAT"},
            {"account_ref": "bank", "side": "K", "amount": "gross", "description": "bank"}
        ],
        "stoplight": {
            "on_missing_required": "CLARIFY",
            "on_fail": "PARK",
            "confidence_threshold": 0.85
        }
    }
}"#;

/// Plain domestic office supplies at 25% VAT.
pub const SE_OFFICE_SUPPLIES_V1: &str = r#"{
    "id": "SE_OFFICE_SUPPLIES_V1",
    "version": "V1",
    "country": "SE",
    "name": "Office supplies (SE)",
    "effective_from": "2025-01-01",
    "catalog_version": "2025_v1.0",
    "rules": {
        "match": {
            "intent": "office_supplies"
        },
        "vat": {
            "rate": 25,
            "code": "25"
        },
        "posting": [
            {"account": "6110", "side": "D", "amount": "net", "description": "office supplies"},
            {"account": "2640", "side": "D", "amount": "vat", "description": "input VAT"},
            {"account_ref": "bank", "side": "K", "amount": "gross", "description": "bank"}
        ],
        "stoplight": {
            "confidence_threshold": 0.8
        }
    }
}"#;

/// Parses the built-in policy documents.
///
/// # Errors
///
/// Returns `PolicyError` if any embedded document fails schema checks;
/// this indicates a packaging defect and is fatal at startup.
pub fn builtin_policies() -> Result<Vec<Policy>, PolicyError> {
    [SE_REPR_MEAL_V1, SE_SAAS_REVERSE_V1, SE_OFFICE_SUPPLIES_V1]
        .iter()
        .map(|doc| Policy::from_json(doc))
        .collect()
}
