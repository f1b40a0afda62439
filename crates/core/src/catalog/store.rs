//! Date-indexed store of catalog versions.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;

use super::error::CatalogError;
use super::types::{AccountCatalog, AccountRecord};

/// Immutable collection of catalog versions, indexed by version label.
///
/// Load failures (duplicate versions, duplicate account numbers) are fatal:
/// the constructor refuses the whole set.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    catalogs: BTreeMap<String, AccountCatalog>,
}

impl CatalogStore {
    /// Builds a store from catalog datasets.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if a version label repeats or any catalog
    /// contains duplicate account numbers.
    pub fn new(catalogs: Vec<AccountCatalog>) -> Result<Self, CatalogError> {
        let mut indexed = BTreeMap::new();
        for catalog in catalogs {
            catalog.check_unique_numbers()?;
            info!(
                version = %catalog.version,
                accounts = catalog.accounts.len(),
                "loaded account catalog"
            );
            if indexed.contains_key(&catalog.version) {
                return Err(CatalogError::DuplicateVersion(catalog.version.clone()));
            }
            indexed.insert(catalog.version.clone(), catalog);
        }
        Ok(Self { catalogs: indexed })
    }

    /// Builds a store with the built-in BAS datasets.
    ///
    /// # Errors
    ///
    /// Propagates validation failures from [`CatalogStore::new`].
    pub fn with_builtin() -> Result<Self, CatalogError> {
        Self::new(vec![super::builtin::bas_2025_v1(), super::builtin::bas_2025_v2()])
    }

    /// Returns the catalog with the given version.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown versions.
    pub fn get(&self, version: &str) -> Result<&AccountCatalog, CatalogError> {
        self.catalogs
            .get(version)
            .ok_or_else(|| CatalogError::NotFound(version.to_string()))
    }

    /// Resolves the catalog effective for a country on a date.
    ///
    /// When effective windows overlap on the requested date (a same-day
    /// cutover), the newer catalog wins.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NoCatalogForDate` when nothing matches.
    pub fn resolve_for_date(
        &self,
        country: &str,
        date: NaiveDate,
    ) -> Result<&AccountCatalog, CatalogError> {
        self.catalogs
            .values()
            .filter(|c| c.serves_region(country) && c.contains_date(date))
            .max_by(|a, b| {
                a.effective_from
                    .cmp(&b.effective_from)
                    .then_with(|| a.version.cmp(&b.version))
            })
            .ok_or_else(|| CatalogError::NoCatalogForDate {
                country: country.to_string(),
                date,
            })
    }

    /// Validates an account number against a named catalog version.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `UnknownAccount`, or `RegionNotAllowed`.
    pub fn validate_number(
        &self,
        version: &str,
        number: &str,
        country: &str,
    ) -> Result<&AccountRecord, CatalogError> {
        self.get(version)?.validate_account(number, country)
    }

    /// Returns all loaded versions, oldest label first.
    #[must_use]
    pub fn versions(&self) -> Vec<&str> {
        self.catalogs.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin::{bas_2025_v1, bas_2025_v2};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_get_by_version() {
        let store = CatalogStore::with_builtin().unwrap();
        assert!(store.get("2025_v1.0").is_ok());
        assert!(matches!(
            store.get("1999_v0.1"),
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_for_date_windows() {
        let store = CatalogStore::with_builtin().unwrap();

        // Last day of the old window stays with the old catalog.
        let cat = store.resolve_for_date("SE", date(2025, 6, 30)).unwrap();
        assert_eq!(cat.version, "2025_v1.0");

        // First day of the new window is served by the new catalog.
        let cat = store.resolve_for_date("SE", date(2025, 7, 1)).unwrap();
        assert_eq!(cat.version, "2025_v2.0");

        assert!(matches!(
            store.resolve_for_date("SE", date(2024, 12, 31)),
            Err(CatalogError::NoCatalogForDate { .. })
        ));
        assert!(matches!(
            store.resolve_for_date("NO", date(2025, 3, 1)),
            Err(CatalogError::NoCatalogForDate { .. })
        ));
    }

    #[test]
    fn test_same_day_cutover_goes_to_newer() {
        let mut v1 = bas_2025_v1();
        // Overlap: v1 still effective on the day v2 starts.
        v1.effective_to = Some(date(2025, 7, 1));
        let store = CatalogStore::new(vec![v1, bas_2025_v2()]).unwrap();

        let cat = store.resolve_for_date("SE", date(2025, 7, 1)).unwrap();
        assert_eq!(cat.version, "2025_v2.0");
    }

    #[test]
    fn test_duplicate_version_is_fatal() {
        let result = CatalogStore::new(vec![bas_2025_v1(), bas_2025_v1()]);
        assert!(matches!(result, Err(CatalogError::DuplicateVersion(_))));
    }

    #[test]
    fn test_validate_number() {
        let store = CatalogStore::with_builtin().unwrap();
        assert!(store.validate_number("2025_v1.0", "1930", "SE").is_ok());
        assert!(matches!(
            store.validate_number("2025_v1.0", "6073", "SE"),
            Err(CatalogError::UnknownAccount { .. })
        ));
        assert!(store.validate_number("2025_v2.0", "6073", "SE").is_ok());
    }
}
