/// Persistence for targets and their check history
///
/// Backed by a local LibSQL file behind a deadpool pool.
pub mod migrations;
pub mod models;
pub mod repository;

pub use models::{Summary, TargetStatus};
pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
