/// Observation store
///
/// Durable, append-only log of probe observations on top of LibSQL, with the
/// two read paths the status and history queries need.

pub mod error;
pub mod migrations;
pub mod repository;

pub use error::StoreError;
pub use repository::{LibsqlStore, ObservationStore};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
