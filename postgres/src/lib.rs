//! # Ticket Tix PostgreSQL
//!
//! Durable implementations of the inventory ledger and the booking store.
//!
//! The two stores live in separate databases (the inventory authority and the
//! booking front-door each own theirs), so each has its own migration set:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use sqlx::postgres::PgPoolOptions;
//!
//! let inventory = PgPoolOptions::new().connect("postgres://localhost/inventory").await?;
//! ticket_tix_postgres::migrate_inventory(&inventory).await?;
//! let ledger = ticket_tix_postgres::PostgresLedger::new(inventory);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod bookings;
pub mod error;
mod ledger;
mod rows;

pub use bookings::PostgresBookingStore;
pub use error::map_sqlx;
pub use ledger::PostgresLedger;

use sqlx::PgPool;
use sqlx::migrate::MigrateError;

/// Apply the inventory schema (categories, seats, stock holds).
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn migrate_inventory(pool: &PgPool) -> Result<(), MigrateError> {
    let mut migrator = sqlx::migrate!("./migrations/inventory");
    // Both schemas may share one database in tests.
    migrator.set_ignore_missing(true);
    migrator.run(pool).await
}

/// Apply the booking schema.
///
/// # Errors
///
/// Returns an error if a migration fails to apply.
pub async fn migrate_bookings(pool: &PgPool) -> Result<(), MigrateError> {
    let mut migrator = sqlx::migrate!("./migrations/bookings");
    migrator.set_ignore_missing(true);
    migrator.run(pool).await
}
