//! Currency codes and monetary rounding helpers.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! All monetary amounts are `rust_decimal::Decimal` with two fractional
//! digits; rounding uses banker's rounding (round half to even) and is
//! applied once, at the final step of a calculation.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of fractional digits for monetary amounts.
pub const CENT_PRECISION: u32 = 2;

/// ISO 4217 currency codes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Swedish Krona
    Sek,
    /// Norwegian Krone
    Nok,
    /// Danish Krone
    Dkk,
    /// Euro
    Eur,
    /// US Dollar
    Usd,
}

/// Rounds a monetary amount to cents using banker's rounding.
///
/// Banker's rounding (round half to even) minimizes cumulative errors
/// across many postings.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CENT_PRECISION, RoundingStrategy::MidpointNearestEven)
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sek => write!(f, "SEK"),
            Self::Nok => write!(f, "NOK"),
            Self::Dkk => write!(f, "DKK"),
            Self::Eur => write!(f, "EUR"),
            Self::Usd => write!(f, "USD"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SEK" => Ok(Self::Sek),
            "NOK" => Ok(Self::Nok),
            "DKK" => Ok(Self::Dkk),
            "EUR" => Ok(Self::Eur),
            "USD" => Ok(Self::Usd),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}
