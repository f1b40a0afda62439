//! Chart-of-accounts catalog types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::CatalogError;

/// Account classification in the chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Asset account (e.g. bank).
    Asset,
    /// Liability account (e.g. VAT payable).
    Liability,
    /// Equity account.
    Equity,
    /// Income account.
    Income,
    /// Expense account.
    Expense,
}

impl AccountType {
    /// Returns the string representation of the type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

/// One account in a catalog version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountRecord {
    /// Account number (e.g. "6071").
    pub number: String,
    /// Account name (e.g. "Representation, avdragsgill").
    pub name: String,
    /// Account class prefix (e.g. "60").
    pub class: String,
    /// Account type.
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// Suggested VAT rate in percent, when the account implies one.
    #[serde(default)]
    pub default_vat_rate: Option<Decimal>,
    /// Regions the account may be used in; empty means unrestricted.
    #[serde(default)]
    pub allowed_regions: Vec<String>,
    /// Semantic tags used by policies (`bank`, `rounding`, ...).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AccountRecord {
    /// Returns true if the account may be used in the given region.
    #[must_use]
    pub fn allows_region(&self, country: &str) -> bool {
        self.allowed_regions.is_empty() || self.allowed_regions.iter().any(|r| r == country)
    }
}

/// A dated, versioned chart-of-accounts dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountCatalog {
    /// Version label (e.g. "2025_v1.0").
    pub version: String,
    /// First date this catalog applies to.
    pub effective_from: NaiveDate,
    /// Last date this catalog applies to; open-ended when absent.
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    /// Regions this catalog serves.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// The accounts, unique by number.
    pub accounts: Vec<AccountRecord>,
}

fn default_regions() -> Vec<String> {
    vec!["SE".to_string()]
}

impl AccountCatalog {
    /// Parses a catalog from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed documents and
    /// `CatalogError::DuplicateAccount` for repeated numbers.
    pub fn from_json(document: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_json::from_str(document).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.check_unique_numbers()?;
        Ok(catalog)
    }

    /// Verifies that account numbers are unique within the catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateAccount` on the first repeated number.
    pub fn check_unique_numbers(&self) -> Result<(), CatalogError> {
        let mut seen = std::collections::BTreeSet::new();
        for account in &self.accounts {
            if !seen.insert(account.number.as_str()) {
                return Err(CatalogError::DuplicateAccount {
                    number: account.number.clone(),
                    version: self.version.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns the account with the given number, if present.
    #[must_use]
    pub fn get_account(&self, number: &str) -> Option<&AccountRecord> {
        self.accounts.iter().find(|a| a.number == number)
    }

    /// Returns true if the given date falls within the effective window.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.effective_from && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Returns true if this catalog serves the given region.
    #[must_use]
    pub fn serves_region(&self, country: &str) -> bool {
        self.regions.iter().any(|r| r == country)
    }

    /// Validates that an account exists and is permitted for the region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAccount` or `RegionNotAllowed`.
    pub fn validate_account(
        &self,
        number: &str,
        country: &str,
    ) -> Result<&AccountRecord, CatalogError> {
        let account = self
            .get_account(number)
            .ok_or_else(|| CatalogError::UnknownAccount {
                number: number.to_string(),
                version: self.version.clone(),
            })?;

        if !account.allows_region(country) {
            return Err(CatalogError::RegionNotAllowed {
                number: number.to_string(),
                country: country.to_string(),
            });
        }

        Ok(account)
    }

    /// Resolves a semantic tag to exactly one account for the region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTag` when no account carries the tag and
    /// `AmbiguousTag` when more than one does.
    pub fn resolve_tag(&self, tag: &str, country: &str) -> Result<&AccountRecord, CatalogError> {
        let mut matches = self
            .accounts
            .iter()
            .filter(|a| a.allows_region(country) && a.tags.iter().any(|t| t == tag));

        let first = matches.next().ok_or_else(|| CatalogError::UnknownTag {
            tag: tag.to_string(),
            version: self.version.clone(),
            country: country.to_string(),
        })?;

        if matches.next().is_some() {
            return Err(CatalogError::AmbiguousTag {
                tag: tag.to_string(),
                version: self.version.clone(),
                country: country.to_string(),
            });
        }

        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(number: &str, tags: &[&str]) -> AccountRecord {
        AccountRecord {
            number: number.to_string(),
            name: format!("Account {number}"),
            class: number[..2].to_string(),
            account_type: AccountType::Expense,
            default_vat_rate: Some(dec!(25)),
            allowed_regions: vec!["SE".to_string()],
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    fn catalog() -> AccountCatalog {
        AccountCatalog {
            version: "test_v1".to_string(),
            effective_from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            effective_to: Some(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
            regions: vec!["SE".to_string()],
            accounts: vec![account("6071", &[]), account("1930", &["bank"])],
        }
    }

    #[test]
    fn test_get_account() {
        let cat = catalog();
        assert!(cat.get_account("6071").is_some());
        assert!(cat.get_account("9999").is_none());
    }

    #[test]
    fn test_contains_date_boundaries() {
        let cat = catalog();
        assert!(cat.contains_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(cat.contains_date(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()));
        assert!(!cat.contains_date(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(!cat.contains_date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }

    #[test]
    fn test_validate_account_region() {
        let cat = catalog();
        assert!(cat.validate_account("6071", "SE").is_ok());
        assert!(matches!(
            cat.validate_account("6071", "NO"),
            Err(CatalogError::RegionNotAllowed { .. })
        ));
        assert!(matches!(
            cat.validate_account("9999", "SE"),
            Err(CatalogError::UnknownAccount { .. })
        ));
    }

    #[test]
    fn test_resolve_tag() {
        let cat = catalog();
        let bank = cat.resolve_tag("bank", "SE").unwrap();
        assert_eq!(bank.number, "1930");
        assert!(matches!(
            cat.resolve_tag("rounding", "SE"),
            Err(CatalogError::UnknownTag { .. })
        ));
    }

    #[test]
    fn test_resolve_tag_ambiguous() {
        let mut cat = catalog();
        cat.accounts.push(account("1940", &["bank"]));
        assert!(matches!(
            cat.resolve_tag("bank", "SE"),
            Err(CatalogError::AmbiguousTag { .. })
        ));
    }

    #[test]
    fn test_duplicate_numbers_rejected() {
        let mut cat = catalog();
        cat.accounts.push(account("6071", &[]));
        assert!(matches!(
            cat.check_unique_numbers(),
            Err(CatalogError::DuplicateAccount { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let doc = r#"{
            "version": "x",
            "effective_from": "2025-01-01",
            "accounts": [],
            "surprise": true
        }"#;
        assert!(matches!(
            AccountCatalog::from_json(doc),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_from_json_valid() {
        let doc = r#"{
            "version": "2025_v1.0",
            "effective_from": "2025-01-01",
            "effective_to": "2025-06-30",
            "regions": ["SE"],
            "accounts": [
                {
                    "number": "1930",
                    "name": "Kassa och bank",
                    "class": "19",
                    "type": "asset",
                    "allowed_regions": ["SE"],
                    "tags": ["bank"]
                }
            ]
        }"#;
        let cat = AccountCatalog::from_json(doc).unwrap();
        assert_eq!(cat.version, "2025_v1.0");
        assert_eq!(cat.accounts.len(), 1);
        assert_eq!(cat.accounts[0].account_type, AccountType::Asset);
    }
}
