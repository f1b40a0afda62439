//! Date-indexed policy store with selection by specificity.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::catalog::CatalogStore;

use super::error::PolicyError;
use super::types::Policy;

/// Immutable collection of validated policies.
///
/// Schema violations are fatal at load time. Policies whose account
/// references do not resolve against their catalog are excluded from
/// selection (and logged) rather than failing the whole load.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    policies: Vec<Policy>,
    rejected: Vec<String>,
}

impl PolicyStore {
    /// Builds a store from policy documents, validating account references
    /// against the given catalogs.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Invalid` when a document violates the DSL
    /// schema.
    pub fn new(policies: Vec<Policy>, catalogs: &CatalogStore) -> Result<Self, PolicyError> {
        let mut accepted = Vec::with_capacity(policies.len());
        let mut rejected = Vec::new();

        for policy in policies {
            policy.check_schema()?;

            match Self::validate_accounts(&policy, catalogs) {
                Ok(()) => accepted.push(policy),
                Err(error) => {
                    warn!(
                        policy = %policy.id,
                        %error,
                        "policy excluded from selection"
                    );
                    rejected.push(policy.id.clone());
                }
            }
        }

        Self::warn_on_ambiguous_overlaps(&accepted);
        info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            "policy store loaded"
        );

        Ok(Self {
            policies: accepted,
            rejected,
        })
    }

    /// Builds a store from the built-in policy documents.
    ///
    /// # Errors
    ///
    /// Propagates parse and schema failures.
    pub fn with_builtin(catalogs: &CatalogStore) -> Result<Self, PolicyError> {
        Self::new(super::builtin::builtin_policies()?, catalogs)
    }

    /// Validates every posting account of a policy against its catalog.
    fn validate_accounts(policy: &Policy, catalogs: &CatalogStore) -> Result<(), PolicyError> {
        let catalog =
            catalogs
                .get(&policy.catalog_version)
                .map_err(|e| PolicyError::Validation {
                    id: policy.id.clone(),
                    reason: e.to_string(),
                })?;

        for line in &policy.rules.posting {
            let result = match (&line.account, &line.account_ref) {
                (Some(number), _) => catalog.validate_account(number, &policy.country).map(|_| ()),
                (None, Some(tag)) => catalog.resolve_tag(tag, &policy.country).map(|_| ()),
                (None, None) => continue,
            };
            result.map_err(|e| PolicyError::Validation {
                id: policy.id.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Flags policies that overlap in effective window at equal
    /// specificity for the same country and intent.
    fn warn_on_ambiguous_overlaps(policies: &[Policy]) {
        for (i, a) in policies.iter().enumerate() {
            for b in policies.iter().skip(i + 1) {
                if a.country != b.country
                    || a.rules.matcher.intent != b.rules.matcher.intent
                    || a.specificity() != b.specificity()
                {
                    continue;
                }
                let a_to = a.effective_to.unwrap_or(NaiveDate::MAX);
                let b_to = b.effective_to.unwrap_or(NaiveDate::MAX);
                if a.effective_from <= b_to && b.effective_from <= a_to {
                    warn!(
                        first = %a.id,
                        second = %b.id,
                        "ambiguous policy overlap; newer version wins at selection"
                    );
                }
            }
        }
    }

    /// Returns the policy with the given id.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::NotFound` when absent.
    pub fn get(&self, id: &str) -> Result<&Policy, PolicyError> {
        self.policies
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))
    }

    /// Selects the policies applicable for a country, intent, and date,
    /// ordered narrowest match first, then newest version.
    #[must_use]
    pub fn select(&self, country: &str, intent: &str, date: NaiveDate) -> Vec<&Policy> {
        let mut matches: Vec<&Policy> = self
            .policies
            .iter()
            .filter(|p| {
                p.country == country
                    && p.rules.matcher.intent.as_deref() == Some(intent)
                    && p.is_effective(date)
            })
            .collect();

        matches.sort_by(|a, b| {
            b.specificity()
                .cmp(&a.specificity())
                .then_with(|| b.version_ordinal().cmp(&a.version_ordinal()))
        });
        matches
    }

    /// Ids of policies excluded at load time.
    #[must_use]
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// All accepted policies.
    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }
}
