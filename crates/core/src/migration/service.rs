//! Pairwise policy migration between catalog versions.

use std::collections::BTreeMap;

use tracing::info;

use crate::catalog::CatalogStore;
use crate::policy::Policy;

use super::error::MigrationError;
use super::types::{self, MigrationRules};

/// Registry of pairwise migration rules and the migration operation.
#[derive(Debug, Clone, Default)]
pub struct MigrationService {
    rules: BTreeMap<(String, String), MigrationRules>,
}

impl MigrationService {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the built-in BAS rules.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut service = Self::new();
        service.register(types::bas_2025_v1_to_v2());
        service
    }

    /// Registers rules for a version pair, replacing any existing entry.
    pub fn register(&mut self, rules: MigrationRules) {
        self.rules.insert(
            (rules.from_version.clone(), rules.to_version.clone()),
            rules,
        );
    }

    /// Returns the rules for a version pair, if registered.
    #[must_use]
    pub fn rules_for(&self, from: &str, to: &str) -> Option<&MigrationRules> {
        self.rules.get(&(from.to_string(), to.to_string()))
    }

    /// Migrates a policy to the target catalog version.
    ///
    /// Posting accounts are rewritten through the account mapping, the
    /// result is validated against the target catalog, the policy version
    /// is bumped, and `migrated_from` records the source catalog version.
    /// A policy already on the target version is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` when no rules exist for the pair, a source
    /// account is deprecated without a mapping, or a rewritten account is
    /// absent from the target catalog.
    pub fn migrate(
        &self,
        policy: &Policy,
        target_version: &str,
        catalogs: &CatalogStore,
    ) -> Result<Policy, MigrationError> {
        if policy.catalog_version == target_version {
            return Ok(policy.clone());
        }

        let rules = self
            .rules_for(&policy.catalog_version, target_version)
            .ok_or_else(|| MigrationError::NoRuleForPair {
                from: policy.catalog_version.clone(),
                to: target_version.to_string(),
            })?;

        let mut migrated = policy.clone();

        for line in &mut migrated.rules.posting {
            let Some(account) = line.account.clone() else {
                continue;
            };

            if let Some(new_account) = rules.account_mappings.get(&account) {
                line.account = Some(new_account.clone());
            } else if rules.deprecated_accounts.contains(&account) {
                return Err(MigrationError::Blocked {
                    account,
                    target: target_version.to_string(),
                });
            }
        }

        if let Some(vat) = &mut migrated.rules.vat {
            let rate_change = migrated.rules.posting.iter().find_map(|line| {
                line.account
                    .as_ref()
                    .and_then(|account| rules.vat_rate_changes.get(account))
            });
            if let Some(change) = rate_change {
                if vat.rate == change.old_rate {
                    vat.rate = change.new_rate;
                }
            }
        }

        let catalog = catalogs.get(target_version).map_err(|e| {
            MigrationError::UnknownAccount {
                account: String::new(),
                target: target_version.to_string(),
                reason: e.to_string(),
            }
        })?;

        for line in &migrated.rules.posting {
            let result = match (&line.account, &line.account_ref) {
                (Some(number), _) => catalog
                    .validate_account(number, &migrated.country)
                    .map(|_| ()),
                (None, Some(tag)) => catalog.resolve_tag(tag, &migrated.country).map(|_| ()),
                (None, None) => continue,
            };
            if let Err(e) = result {
                return Err(MigrationError::UnknownAccount {
                    account: line
                        .account
                        .clone()
                        .or_else(|| line.account_ref.clone())
                        .unwrap_or_default(),
                    target: target_version.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        migrated.version = bump_version(&policy.version)?;
        migrated.migrated_from = Some(policy.catalog_version.clone());
        migrated.catalog_version = target_version.to_string();

        info!(
            policy = %policy.id,
            from = %policy.catalog_version,
            to = %target_version,
            "policy migrated"
        );

        Ok(migrated)
    }
}

/// Bumps a `V<n>` version label to `V<n+1>`.
fn bump_version(version: &str) -> Result<String, MigrationError> {
    let digits = version.trim_start_matches(|c: char| !c.is_ascii_digit());
    let ordinal: u32 = digits
        .parse()
        .map_err(|_| MigrationError::InvalidVersion(version.to_string()))?;
    let prefix = &version[..version.len() - digits.len()];
    Ok(format!("{prefix}{}", ordinal + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::builtin_policies;

    fn meal_policy() -> Policy {
        builtin_policies().unwrap().remove(0)
    }

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version("V1").unwrap(), "V2");
        assert_eq!(bump_version("V9").unwrap(), "V10");
        assert!(bump_version("latest").is_err());
    }

    #[test]
    fn test_migrate_to_same_version_is_noop() {
        let catalogs = CatalogStore::with_builtin().unwrap();
        let service = MigrationService::with_builtin();
        let policy = meal_policy();

        let migrated = service.migrate(&policy, "2025_v1.0", &catalogs).unwrap();
        assert_eq!(migrated, policy);
    }

    #[test]
    fn test_migrate_v1_to_v2() {
        let catalogs = CatalogStore::with_builtin().unwrap();
        let service = MigrationService::with_builtin();
        let policy = meal_policy();

        let migrated = service.migrate(&policy, "2025_v2.0", &catalogs).unwrap();
        assert_eq!(migrated.catalog_version, "2025_v2.0");
        assert_eq!(migrated.version, "V2");
        assert_eq!(migrated.migrated_from.as_deref(), Some("2025_v1.0"));
        assert_eq!(migrated.id, policy.id);
        // Empty mapping: accounts unchanged.
        assert_eq!(
            migrated.rules.posting[0].account,
            policy.rules.posting[0].account
        );
    }

    #[test]
    fn test_migrate_without_rules_fails() {
        let catalogs = CatalogStore::with_builtin().unwrap();
        let service = MigrationService::new();
        let policy = meal_policy();

        assert!(matches!(
            service.migrate(&policy, "2025_v2.0", &catalogs),
            Err(MigrationError::NoRuleForPair { .. })
        ));
    }

    #[test]
    fn test_deprecated_account_blocks_migration() {
        let catalogs = CatalogStore::with_builtin().unwrap();
        let mut service = MigrationService::new();
        let mut rules = crate::migration::types::bas_2025_v1_to_v2();
        rules.deprecated_accounts.push("6071".to_string());
        service.register(rules);

        let policy = meal_policy();
        let result = service.migrate(&policy, "2025_v2.0", &catalogs);
        assert!(matches!(
            result,
            Err(MigrationError::Blocked { ref account, .. }) if account == "6071"
        ));
    }

    #[test]
    fn test_mapping_to_unknown_account_fails_validation() {
        let catalogs = CatalogStore::with_builtin().unwrap();
        let mut service = MigrationService::new();
        let mut rules = crate::migration::types::bas_2025_v1_to_v2();
        rules
            .account_mappings
            .insert("6071".to_string(), "9999".to_string());
        service.register(rules);

        let policy = meal_policy();
        assert!(matches!(
            service.migrate(&policy, "2025_v2.0", &catalogs),
            Err(MigrationError::UnknownAccount { .. })
        ));
    }

    #[test]
    fn test_round_trip_with_invertible_rules() {
        let catalogs = CatalogStore::with_builtin().unwrap();
        let mut service = MigrationService::with_builtin();
        let forward = crate::migration::types::bas_2025_v1_to_v2();
        service.register(forward.invert().unwrap());

        let policy = meal_policy();
        let there = service.migrate(&policy, "2025_v2.0", &catalogs).unwrap();
        let back = service.migrate(&there, "2025_v1.0", &catalogs).unwrap();

        // Equivalent under rule evaluation: same posting and VAT rules.
        assert_eq!(back.rules, policy.rules);
        assert_eq!(back.catalog_version, policy.catalog_version);
    }
}
