//! Rule engine error types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Typed failures from the rule engine.
///
/// The engine never panics or raises across its boundary; every failure
/// is one of these values.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The policy's match predicate rejects the input.
    #[error("Policy {policy_id} does not apply: {reason}")]
    PolicyNotApplicable {
        /// The rejected policy.
        policy_id: String,
        /// Which predicate failed.
        reason: String,
    },

    /// VAT inputs are inconsistent (negative net, rate out of range, ...).
    #[error("VAT computation failed: {reason}")]
    VatComputation {
        /// What is inconsistent.
        reason: String,
    },

    /// A template references an account absent from the active catalog.
    #[error("Unknown account in posting template: {reason}")]
    UnknownAccount {
        /// The underlying catalog failure.
        reason: String,
    },

    /// Debits and credits differ beyond the rounding tolerance.
    #[error("Proposal is unbalanced: debit {debit}, credit {credit}")]
    ProposalUnbalanced {
        /// Total debit amount.
        debit: Decimal,
        /// Total credit amount.
        credit: Decimal,
    },
}

impl EngineError {
    /// Returns the error taxonomy tag.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PolicyNotApplicable { .. } => "POLICY_NOT_APPLICABLE",
            Self::VatComputation { .. } => "VAT_COMPUTATION",
            Self::UnknownAccount { .. } => "UNKNOWN_ACCOUNT",
            Self::ProposalUnbalanced { .. } => "PROPOSAL_UNBALANCED",
        }
    }
}
