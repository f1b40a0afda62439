//! Migration rule types.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// VAT rate override accompanying an account between versions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VatRateChange {
    /// Rate in the source catalog version, in percent.
    pub old_rate: Decimal,
    /// Rate in the target catalog version, in percent.
    pub new_rate: Decimal,
}

/// Rules for migrating policies between two named catalog versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationRules {
    /// Source catalog version.
    pub from_version: String,
    /// Target catalog version.
    pub to_version: String,
    /// Account renumberings, old number to new number.
    #[serde(default)]
    pub account_mappings: BTreeMap<String, String>,
    /// Accounts introduced by the target version.
    #[serde(default)]
    pub new_accounts: Vec<String>,
    /// Accounts removed by the target version.
    #[serde(default)]
    pub deprecated_accounts: Vec<String>,
    /// Per-account VAT rate overrides.
    #[serde(default)]
    pub vat_rate_changes: BTreeMap<String, VatRateChange>,
}

impl MigrationRules {
    /// Builds the inverse rule set, when the mapping is fully invertible.
    ///
    /// Returns `None` if the account mapping is not a bijection; an
    /// inverse then does not exist and the caller must author one.
    #[must_use]
    pub fn invert(&self) -> Option<Self> {
        let mut inverted = BTreeMap::new();
        for (old, new) in &self.account_mappings {
            if inverted.insert(new.clone(), old.clone()).is_some() {
                return None;
            }
        }

        let vat_rate_changes = self
            .vat_rate_changes
            .iter()
            .map(|(account, change)| {
                let account = self
                    .account_mappings
                    .get(account)
                    .cloned()
                    .unwrap_or_else(|| account.clone());
                (
                    account,
                    VatRateChange {
                        old_rate: change.new_rate,
                        new_rate: change.old_rate,
                    },
                )
            })
            .collect();

        Some(Self {
            from_version: self.to_version.clone(),
            to_version: self.from_version.clone(),
            account_mappings: inverted,
            new_accounts: self.deprecated_accounts.clone(),
            deprecated_accounts: self.new_accounts.clone(),
            vat_rate_changes,
        })
    }
}

/// Built-in rules for the BAS 2025 v1.0 to v2.0 cutover.
#[must_use]
pub fn bas_2025_v1_to_v2() -> MigrationRules {
    MigrationRules {
        from_version: "2025_v1.0".to_string(),
        to_version: "2025_v2.0".to_string(),
        account_mappings: BTreeMap::new(),
        new_accounts: vec!["6073".to_string(), "6542".to_string()],
        deprecated_accounts: Vec::new(),
        vat_rate_changes: BTreeMap::new(),
    }
}
