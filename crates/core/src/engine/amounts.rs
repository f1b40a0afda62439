//! VAT breakdown computation.
//!
//! All figures are decimals; banker's rounding to cents happens once, at
//! the final step of each published figure. Derived figures keep the exact
//! identities `net + vat = gross` and
//! `vat_deductible + vat_non_deductible = vat`.

use rust_decimal::Decimal;

use bokpilot_shared::types::round_cents;

use crate::policy::{AmountExpr, VatMode, VatRule};

use super::error::EngineError;

/// The computed amounts for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct VatBreakdown {
    /// Total including VAT (for reverse charge: the invoiced net).
    pub gross: Decimal,
    /// Net amount.
    pub net: Decimal,
    /// Total VAT contained in the gross.
    pub vat: Decimal,
    /// Deductible net after the per-person cap.
    pub deductible_net: Decimal,
    /// Net above the cap.
    pub non_deductible_net: Decimal,
    /// VAT on the deductible net.
    pub vat_deductible: Decimal,
    /// VAT above the deductible portion.
    pub vat_non_deductible: Decimal,
    /// Output VAT under reverse charge.
    pub vat_output: Decimal,
    /// Input VAT under reverse charge.
    pub vat_input: Decimal,
    /// The VAT mode the figures were computed under.
    pub mode: VatMode,
    /// True if the per-person cap actually reduced the deductible net.
    pub cap_applied: bool,
}

impl VatBreakdown {
    /// Returns the figure for a named amount formula.
    #[must_use]
    pub fn amount_for(&self, expr: AmountExpr) -> Decimal {
        match expr {
            AmountExpr::Gross => self.gross,
            AmountExpr::Net => self.net,
            AmountExpr::Vat => self.vat,
            AmountExpr::DeductibleNet => self.deductible_net,
            AmountExpr::NonDeductibleNet => self.non_deductible_net,
            AmountExpr::VatDeductible => self.vat_deductible,
            AmountExpr::VatNonDeductible => self.vat_non_deductible,
            AmountExpr::VatOutput => self.vat_output,
            AmountExpr::VatInput => self.vat_input,
        }
    }
}

/// Computes the VAT breakdown for a gross amount under a policy's VAT rule.
///
/// `attendees` feeds the per-person cap; the cap applies only when the
/// rule sets one and at least one attendee is known.
///
/// # Errors
///
/// Returns `EngineError::VatComputation` for a negative gross, a rate
/// outside [0, 100], or a negative attendee count.
pub fn compute_vat(
    gross: Decimal,
    rule: &VatRule,
    attendees: Option<i64>,
) -> Result<VatBreakdown, EngineError> {
    if gross < Decimal::ZERO {
        return Err(EngineError::VatComputation {
            reason: format!("gross cannot be negative: {gross}"),
        });
    }
    if rule.rate < Decimal::ZERO || rule.rate > Decimal::ONE_HUNDRED {
        return Err(EngineError::VatComputation {
            reason: format!("rate out of range: {}", rule.rate),
        });
    }
    if let Some(count) = attendees {
        if count < 0 {
            return Err(EngineError::VatComputation {
                reason: format!("attendees_count cannot be negative: {count}"),
            });
        }
    }

    let gross = round_cents(gross);
    let rate_fraction = rule.rate / Decimal::ONE_HUNDRED;

    if rule.mode == Some(VatMode::ReverseCharge) {
        // The invoiced amount carries no VAT; it is the net, and output
        // and input VAT are computed on top of it.
        let vat_output = round_cents(gross * rate_fraction);
        return Ok(VatBreakdown {
            gross,
            net: gross,
            vat: Decimal::ZERO,
            deductible_net: gross,
            non_deductible_net: Decimal::ZERO,
            vat_deductible: Decimal::ZERO,
            vat_non_deductible: Decimal::ZERO,
            vat_output,
            vat_input: vat_output,
            mode: VatMode::ReverseCharge,
            cap_applied: false,
        });
    }

    let net = round_cents(gross / (Decimal::ONE + rate_fraction));
    let vat = gross - net;

    let capped = matches!((rule.cap_per_person, attendees), (Some(_), Some(n)) if n >= 1);
    if capped {
        let cap_per_person = rule.cap_per_person.unwrap_or_default();
        let count = Decimal::from(attendees.unwrap_or_default());
        let cap_net = cap_per_person * count;

        let deductible_net = net.min(cap_net);
        let non_deductible_net = net - deductible_net;
        let vat_deductible = round_cents(deductible_net * rate_fraction).min(vat);
        let vat_non_deductible = vat - vat_deductible;

        let mode = if rule.deductible_split {
            VatMode::SplitDeductible
        } else {
            VatMode::Capped
        };

        return Ok(VatBreakdown {
            gross,
            net,
            vat,
            deductible_net,
            non_deductible_net,
            vat_deductible,
            vat_non_deductible,
            vat_output: Decimal::ZERO,
            vat_input: Decimal::ZERO,
            mode,
            cap_applied: non_deductible_net > Decimal::ZERO,
        });
    }

    // Standard split; the full VAT is deductible.
    Ok(VatBreakdown {
        gross,
        net,
        vat,
        deductible_net: net,
        non_deductible_net: Decimal::ZERO,
        vat_deductible: vat,
        vat_non_deductible: Decimal::ZERO,
        vat_output: Decimal::ZERO,
        vat_input: Decimal::ZERO,
        mode: VatMode::Standard,
        cap_applied: false,
    })
}
