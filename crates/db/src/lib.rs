//! Database layer with `SeaORM` entities and the Postgres repository.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the persisted state layout
//! - Database migrations
//! - A Postgres-backed implementation of the core repository port

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::PostgresRepository;

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}
