//! Schema migration CLI for the Bokpilot database.
//!
//! Thin wrapper around the sea-orm-migration runner, so the usual
//! subcommands apply: `up` applies pending migrations, `down` rolls the
//! last one back, `status` lists the applied set, and `fresh` rebuilds
//! the schema from scratch. The target database comes from DATABASE_URL;
//! a `.env` file is honoured when present.

use sea_orm_migration::cli;

use bokpilot_db::migration::Migrator;

#[tokio::main]
async fn main() {
    if dotenvy::dotenv().is_ok() {
        eprintln!("migrator: loaded environment from .env");
    }

    let migrator = Migrator;
    cli::run_cli(migrator).await;
}
