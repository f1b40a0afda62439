//! Booking error types.

use rust_decimal::Decimal;
use thiserror::Error;

use bokpilot_shared::types::PipelineRunId;

use crate::repository::RepositoryError;

/// Errors for journal entry creation and lookups.
#[derive(Debug, Error)]
pub enum BookingError {
    /// The proposal does not balance (defense in depth; the engine
    /// should already have enforced this).
    #[error("Entry is not balanced: debit {debit}, credit {credit}")]
    NotBalanced {
        /// Total debit amount.
        debit: Decimal,
        /// Total credit amount.
        credit: Decimal,
    },

    /// The proposal carries no lines.
    #[error("Entry must have at least one line")]
    EmptyEntry,

    /// No entry booked for the given run.
    #[error("No journal entry for pipeline run {0}")]
    NotFoundForRun(PipelineRunId),

    /// Persistence failure.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl BookingError {
    /// Returns the error taxonomy tag.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotBalanced { .. } => "NOT_BALANCED_ON_BOOK",
            Self::EmptyEntry => "NOT_BALANCED_ON_BOOK",
            Self::NotFoundForRun(_) => "NOT_FOUND",
            Self::Repository(_) => "INFRASTRUCTURE",
        }
    }
}
