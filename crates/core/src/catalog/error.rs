//! Catalog error types.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors for catalog loading and lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No catalog with the requested version.
    #[error("Catalog version not found: {0}")]
    NotFound(String),

    /// No catalog covers the given country and date.
    #[error("No catalog for country {country} on {date}")]
    NoCatalogForDate {
        /// ISO 3166-1 alpha-2 country code.
        country: String,
        /// Requested transaction date.
        date: NaiveDate,
    },

    /// Account number is absent from the catalog.
    #[error("Account {number} not found in catalog {version}")]
    UnknownAccount {
        /// The account number.
        number: String,
        /// The catalog version searched.
        version: String,
    },

    /// Account exists but is not permitted for the region.
    #[error("Account {number} is not allowed in region {country}")]
    RegionNotAllowed {
        /// The account number.
        number: String,
        /// The rejected region.
        country: String,
    },

    /// Two accounts in one catalog share a number (fatal at load).
    #[error("Duplicate account {number} in catalog {version}")]
    DuplicateAccount {
        /// The duplicated number.
        number: String,
        /// The offending catalog version.
        version: String,
    },

    /// Two catalogs share a version label (fatal at load).
    #[error("Duplicate catalog version: {0}")]
    DuplicateVersion(String),

    /// A semantic tag resolves to no account.
    #[error("Tag '{tag}' matches no account in catalog {version} for {country}")]
    UnknownTag {
        /// The semantic tag.
        tag: String,
        /// The catalog version searched.
        version: String,
        /// The region filter applied.
        country: String,
    },

    /// A semantic tag resolves to more than one account.
    #[error("Tag '{tag}' is ambiguous in catalog {version} for {country}")]
    AmbiguousTag {
        /// The semantic tag.
        tag: String,
        /// The catalog version searched.
        version: String,
        /// The region filter applied.
        country: String,
    },

    /// Catalog document failed to parse.
    #[error("Invalid catalog document: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Returns the error taxonomy tag.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::NoCatalogForDate { .. } => "CATALOG_MISSING",
            Self::UnknownAccount { .. }
            | Self::RegionNotAllowed { .. }
            | Self::UnknownTag { .. }
            | Self::AmbiguousTag { .. } => "UNKNOWN_ACCOUNT",
            Self::DuplicateAccount { .. } | Self::DuplicateVersion(_) | Self::Parse(_) => {
                "CATALOG_INVALID"
            }
        }
    }
}
