//! Posting proposal types.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::gate::GateDecision;
use crate::policy::{Side, VatMode};

/// One proposed posting line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingLine {
    /// Account number.
    pub account: String,
    /// Debit or credit.
    pub side: Side,
    /// Line amount, always positive.
    pub amount: Decimal,
    /// Line description from the template.
    #[serde(default)]
    pub description: Option<String>,
    /// Dimension values copied from intent slots.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

/// A balanced posting proposal produced by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingProposal {
    /// Posting lines in template order.
    pub lines: Vec<PostingLine>,
    /// VAT code from the policy.
    #[serde(default)]
    pub vat_code: Option<String>,
    /// VAT treatment applied.
    pub vat_mode: VatMode,
    /// VAT report boxes, box id to amount.
    #[serde(default)]
    pub report_boxes: BTreeMap<String, Decimal>,
    /// Intent confidence carried through for the gate.
    pub confidence: f64,
    /// Ordered machine-parseable reason codes.
    pub reason_codes: Vec<String>,
    /// Gate outcome.
    pub gate: GateDecision,
    /// The policy that produced this proposal.
    pub policy_id: String,
    /// Required slots that failed their predicates, in policy order.
    #[serde(default)]
    pub missing_required: Vec<String>,
}

impl PostingProposal {
    /// Sum of debit line amounts.
    #[must_use]
    pub fn debit_total(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.side == Side::D)
            .map(|l| l.amount)
            .sum()
    }

    /// Sum of credit line amounts.
    #[must_use]
    pub fn credit_total(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.side == Side::K)
            .map(|l| l.amount)
            .sum()
    }

    /// True if debits equal credits exactly.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.debit_total() == self.credit_total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(side: Side, amount: Decimal) -> PostingLine {
        PostingLine {
            account: "1930".to_string(),
            side,
            amount,
            description: None,
            dimensions: BTreeMap::new(),
        }
    }

    #[test]
    fn test_totals_and_balance() {
        let proposal = PostingProposal {
            lines: vec![
                line(Side::D, dec!(80.00)),
                line(Side::D, dec!(20.00)),
                line(Side::K, dec!(100.00)),
            ],
            vat_code: None,
            vat_mode: VatMode::Standard,
            report_boxes: BTreeMap::new(),
            confidence: 0.9,
            reason_codes: vec![],
            gate: GateDecision::Auto,
            policy_id: "SE_TEST_V1".to_string(),
            missing_required: vec![],
        };

        assert_eq!(proposal.debit_total(), dec!(100.00));
        assert_eq!(proposal.credit_total(), dec!(100.00));
        assert!(proposal.is_balanced());
    }
}
