//! Versioned chart-of-accounts catalogs.
//!
//! Catalogs are loaded once at startup, are immutable thereafter, and may
//! coexist in multiple versions. Replacement is whole-version only.

pub mod builtin;
pub mod error;
pub mod store;
pub mod types;

pub use builtin::{bas_2025_v1, bas_2025_v2};
pub use error::CatalogError;
pub use store::CatalogStore;
pub use types::{AccountCatalog, AccountRecord, AccountType};
