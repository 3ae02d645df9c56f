//! Afscheid database crate
//!
//! Pool construction with the SQLite pragmas the services rely on, and the
//! embedded schema migrations shared by every crate in the workspace.

use afscheid_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod error;
pub mod migrations;

pub use connection::prepare_database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, MIGRATOR};

/// Connect and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::Connection(format!("{e:#}")))?;

    run_migrations(&pool).await?;

    Ok(pool)
}
