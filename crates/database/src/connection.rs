//! Database connection management

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use afscheid_config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::fs;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Open a pool with foreign keys, WAL and a busy timeout applied to every
/// connection.
pub async fn prepare_database(config: &DatabaseConfig) -> Result<SqlitePool> {
    ensure_sqlite_path(&config.url).await?;

    let in_memory = config.url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("invalid database url {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // Each in-memory connection is a separate database.
    let max_connections = if in_memory {
        1
    } else {
        config.max_connections.max(1)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to database {}", config.url))?;

    info!(url = %config.url, max_connections, "database connection established");
    Ok(pool)
}

/// Ensure the directory holding the SQLite file exists
async fn ensure_sqlite_path(url: &str) -> Result<()> {
    let Some(sqlite_path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let sqlite_path = sqlite_path.split('?').next().unwrap_or_default();
    if sqlite_path.is_empty() || sqlite_path.contains(":memory:") {
        return Ok(());
    }

    let path = Path::new(sqlite_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("failed to create sqlite directory {}", parent.display())
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn connects_and_creates_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/dir/test.db");

        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = prepare_database(&config).await.unwrap();
        sqlx::query("SELECT 1").fetch_one(&pool).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn in_memory_database() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 8,
        };

        let pool = prepare_database(&config).await.unwrap();
        sqlx::query("SELECT 1").fetch_one(&pool).await.unwrap();
        // Every in-memory connection would be a fresh database.
        assert_eq!(pool.options().get_max_connections(), 1);
    }

    #[tokio::test]
    async fn wal_mode_on_file_databases() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("wal.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
        };

        let pool = prepare_database(&config).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
