//! Policy migration between catalog versions.
//!
//! Migration is always pairwise between two named catalog versions;
//! multi-hop migrations are explicit sequences of pairwise steps.

pub mod error;
pub mod service;
pub mod types;

pub use error::MigrationError;
pub use service::MigrationService;
pub use types::{MigrationRules, VatRateChange};
