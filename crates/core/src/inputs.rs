//! Normalized input records consumed by the pipeline.
//!
//! Extraction and intent records are produced by external collaborators
//! (OCR and NLU services). The core consumes them as immutable values and
//! never calls back into those collaborators.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bokpilot_shared::types::Currency;

/// Validation errors for input records.
#[derive(Debug, Error)]
pub enum InputError {
    /// VAT lines sum to more than the document total.
    #[error("VAT lines ({lines_total}) exceed the gross total ({total_gross})")]
    VatExceedsGross {
        /// Sum of VAT bases and amounts.
        lines_total: Decimal,
        /// Gross total of the document.
        total_gross: Decimal,
    },

    /// Gross total is negative.
    #[error("Gross total cannot be negative: {0}")]
    NegativeGross(Decimal),

    /// A VAT line carries a negative base or amount.
    #[error("VAT line amounts cannot be negative")]
    NegativeVatLine,

    /// Intent confidence is outside [0, 1].
    #[error("Intent confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    /// Intent name is empty.
    #[error("Intent name cannot be empty")]
    EmptyIntentName,
}

impl InputError {
    /// Returns the error taxonomy tag.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        "INPUT_INVALID"
    }
}

/// One VAT breakdown line from a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatLine {
    /// VAT rate in percent (e.g. 12 or 25).
    pub rate: Decimal,
    /// Net base the VAT was computed on.
    pub base: Decimal,
    /// VAT amount.
    pub amount: Decimal,
}

/// Normalized receipt data from the external extractor.
///
/// Immutable once produced; the pipeline stores it verbatim in the run
/// payload and never recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Total amount including VAT.
    pub total_gross: Decimal,
    /// Document currency.
    pub currency: Currency,
    /// VAT breakdown lines, in document order.
    #[serde(default)]
    pub vat_lines: Vec<VatLine>,
    /// Vendor name, if recognized.
    #[serde(default)]
    pub vendor: Option<String>,
    /// Document date.
    pub document_date: NaiveDate,
    /// Raw extracted text.
    #[serde(default)]
    pub raw_text: Option<String>,
}

impl ExtractionRecord {
    /// Validates the record invariants.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the gross is negative or the VAT lines
    /// sum to more than the gross total.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.total_gross < Decimal::ZERO {
            return Err(InputError::NegativeGross(self.total_gross));
        }

        let mut lines_total = Decimal::ZERO;
        for line in &self.vat_lines {
            if line.base < Decimal::ZERO || line.amount < Decimal::ZERO {
                return Err(InputError::NegativeVatLine);
            }
            lines_total += line.base + line.amount;
        }

        if lines_total > self.total_gross {
            return Err(InputError::VatExceedsGross {
                lines_total,
                total_gross: self.total_gross,
            });
        }

        Ok(())
    }
}

/// A primitive slot value extracted by intent detection.
///
/// The closed set of primitives keeps the policy DSL comparable without
/// a dynamic value model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    /// Boolean flag.
    Flag(bool),
    /// Whole number (e.g. `attendees_count`).
    Integer(i64),
    /// Decimal number (e.g. an amount threshold).
    Number(Decimal),
    /// Free text (e.g. `purpose`, `supplier_country`).
    Text(String),
}

impl SlotValue {
    /// Returns the value as a decimal, if it is numeric.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Number(d) => Some(*d),
            Self::Text(s) => s.parse().ok(),
            Self::Flag(_) => None,
        }
    }

    /// Returns the value as a whole number, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Number(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Returns the value as text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Classified transaction intent from the external NLU service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    /// Intent name from the closed intent set (e.g. `representation_meal`).
    pub name: String,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
    /// Extracted slots.
    #[serde(default)]
    pub slots: BTreeMap<String, SlotValue>,
}

impl IntentRecord {
    /// Validates the record invariants.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the name is empty or the confidence is
    /// outside [0, 1].
    pub fn validate(&self) -> Result<(), InputError> {
        if self.name.is_empty() {
            return Err(InputError::EmptyIntentName);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(InputError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }

    /// Returns a copy with the given slot updates merged in.
    ///
    /// Updates win over originally extracted slots; used when a
    /// clarification answer arrives.
    #[must_use]
    pub fn with_slot_updates(&self, updates: &BTreeMap<String, SlotValue>) -> Self {
        let mut merged = self.clone();
        for (name, value) in updates {
            merged.slots.insert(name.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn extraction(total: Decimal, vat_lines: Vec<VatLine>) -> ExtractionRecord {
        ExtractionRecord {
            total_gross: total,
            currency: Currency::Sek,
            vat_lines,
            vendor: Some("Restaurang Prinsen".to_string()),
            document_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            raw_text: None,
        }
    }

    #[test]
    fn test_extraction_valid() {
        let record = extraction(
            dec!(1176.00),
            vec![VatLine {
                rate: dec!(12),
                base: dec!(1050.00),
                amount: dec!(126.00),
            }],
        );
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_extraction_vat_exceeds_gross() {
        let record = extraction(
            dec!(100.00),
            vec![VatLine {
                rate: dec!(25),
                base: dec!(100.00),
                amount: dec!(25.00),
            }],
        );
        assert!(matches!(
            record.validate(),
            Err(InputError::VatExceedsGross { .. })
        ));
    }

    #[test]
    fn test_extraction_negative_gross() {
        let record = extraction(dec!(-1.00), vec![]);
        assert!(matches!(record.validate(), Err(InputError::NegativeGross(_))));
    }

    #[test]
    fn test_intent_confidence_bounds() {
        let mut intent = IntentRecord {
            name: "taxi_transport".to_string(),
            confidence: 1.0,
            slots: BTreeMap::new(),
        };
        assert!(intent.validate().is_ok());

        intent.confidence = 1.01;
        assert!(matches!(
            intent.validate(),
            Err(InputError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn test_slot_updates_win() {
        let mut slots = BTreeMap::new();
        slots.insert("attendees_count".to_string(), SlotValue::Integer(1));
        let intent = IntentRecord {
            name: "representation_meal".to_string(),
            confidence: 0.9,
            slots,
        };

        let mut updates = BTreeMap::new();
        updates.insert("attendees_count".to_string(), SlotValue::Integer(3));
        updates.insert(
            "purpose".to_string(),
            SlotValue::Text("client lunch".to_string()),
        );

        let merged = intent.with_slot_updates(&updates);
        assert_eq!(
            merged.slots.get("attendees_count"),
            Some(&SlotValue::Integer(3))
        );
        assert_eq!(merged.slots.len(), 2);
        // Original is untouched.
        assert_eq!(
            intent.slots.get("attendees_count"),
            Some(&SlotValue::Integer(1))
        );
    }

    #[test]
    fn test_slot_value_conversions() {
        assert_eq!(SlotValue::Integer(4).as_decimal(), Some(dec!(4)));
        assert_eq!(SlotValue::Number(dec!(2.5)).as_decimal(), Some(dec!(2.5)));
        assert_eq!(SlotValue::Number(dec!(3)).as_integer(), Some(3));
        assert_eq!(SlotValue::Number(dec!(2.5)).as_integer(), None);
        assert_eq!(SlotValue::Text("abc".to_string()).as_text(), Some("abc"));
        assert_eq!(SlotValue::Flag(true).as_decimal(), None);
    }

    #[test]
    fn test_slot_value_untagged_serde() {
        let value: SlotValue = serde_json::from_str("3").unwrap();
        assert_eq!(value, SlotValue::Integer(3));
        let value: SlotValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, SlotValue::Flag(true));
        let value: SlotValue = serde_json::from_str("\"client lunch\"").unwrap();
        assert!(matches!(value, SlotValue::Text(_) | SlotValue::Number(_)));
    }
}
