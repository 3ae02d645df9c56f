//! Embedded schema migrations

use sqlx::{migrate::Migrator, SqlitePool};
use tracing::info;

use crate::DatabaseResult;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Apply every pending migration.
pub async fn run_migrations(pool: &SqlitePool) -> DatabaseResult<()> {
    MIGRATOR.run(pool).await?;
    info!("database migrations applied");
    Ok(())
}
