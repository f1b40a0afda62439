//! Migration error types.

use thiserror::Error;

/// Errors for policy migration between catalog versions.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No migration rules registered for the version pair.
    #[error("No migration rules from {from} to {to}")]
    NoRuleForPair {
        /// Source catalog version.
        from: String,
        /// Target catalog version.
        to: String,
    },

    /// A source account is deprecated with no mapping to the target.
    #[error("Account {account} is deprecated in {target} with no mapping")]
    Blocked {
        /// The deprecated account.
        account: String,
        /// The target catalog version.
        target: String,
    },

    /// A rewritten account does not exist in the target catalog.
    #[error("Migrated account {account} not found in catalog {target}: {reason}")]
    UnknownAccount {
        /// The unresolved account.
        account: String,
        /// The target catalog version.
        target: String,
        /// The underlying catalog failure.
        reason: String,
    },

    /// The policy version label cannot be bumped.
    #[error("Cannot bump policy version '{0}'")]
    InvalidVersion(String),
}

impl MigrationError {
    /// Returns the error taxonomy tag.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoRuleForPair { .. } | Self::Blocked { .. } => "MIGRATION_BLOCKED",
            Self::UnknownAccount { .. } => "UNKNOWN_ACCOUNT",
            Self::InvalidVersion(_) => "POLICY_INVALID",
        }
    }
}
