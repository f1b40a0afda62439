//! Shared types and configuration for Bokpilot.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Currency codes and decimal rounding helpers
//! - Pagination types for list operations
//! - Configuration management

pub mod config;
pub mod types;

pub use config::AppConfig;
