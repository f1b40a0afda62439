//! Schema migrations for the Bokpilot database.
//!
//! The history is intentionally short: a single baseline migration
//! creates the whole persisted state layout (pipeline runs, journal
//! entries and lines, the append-only audit table, policy documents,
//! and account catalogs). Later schema changes get their own dated
//! module and are appended to [`MigratorTrait::migrations`].

use sea_orm_migration::{MigrationTrait, MigratorTrait};

mod m20250601_000001_initial;

/// Applies the schema history in order.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        // Ordered oldest first; append new migrations at the end.
        let baseline = m20250601_000001_initial::Migration;
        vec![Box::new(baseline)]
    }
}
