//! Repository implementations over `SeaORM`.

pub mod convert;
pub mod postgres;

pub use postgres::PostgresRepository;
