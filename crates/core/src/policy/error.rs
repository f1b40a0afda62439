//! Policy error types.

use thiserror::Error;

/// Errors for policy loading, validation, and lookup.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy document violates the DSL schema.
    #[error("Invalid policy {id}: {reason}")]
    Invalid {
        /// The offending policy id.
        id: String,
        /// What the document violates.
        reason: String,
    },

    /// Policy references accounts or catalogs that do not resolve.
    #[error("Policy {id} failed validation: {reason}")]
    Validation {
        /// The offending policy id.
        id: String,
        /// The unresolved reference.
        reason: String,
    },

    /// No policy with the requested id.
    #[error("Policy not found: {0}")]
    NotFound(String),

    /// Policy document failed to parse.
    #[error("Invalid policy document: {0}")]
    Parse(String),
}

impl PolicyError {
    /// Returns the error taxonomy tag.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } | Self::Validation { .. } | Self::Parse(_) => "POLICY_INVALID",
            Self::NotFound(_) => "POLICY_NOT_FOUND",
        }
    }
}
