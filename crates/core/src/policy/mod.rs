//! Versioned policy DSL documents and the policy store.
//!
//! A policy maps an intent + context to a posting template and VAT
//! treatment, bound to a specific catalog version. Documents are validated
//! against the closed DSL vocabulary at load time; runtime account
//! mismatches exclude a policy from selection instead of failing the load.

pub mod builtin;
pub mod error;
pub mod store;
pub mod types;

pub use builtin::builtin_policies;
pub use error::PolicyError;
pub use store::PolicyStore;
pub use types::{
    AmountExpr, MatchRule, Policy, PolicyRules, PostingTemplate, RequireOp, Requirement, Side,
    StoplightRule, VatMode, VatRule,
};
