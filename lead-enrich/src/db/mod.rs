//! SQLite database for checkpoints and write-back patches
//!
//! One `lead-enrich.db` under the root folder. WAL mode so readers of the
//! patch table never block checkpoint writes.

use lead_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DB_FILE: &str = "lead-enrich.db";

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DB_FILE)
}

/// Open (creating if missing) the database and its tables
pub async fn init_database(db_path: &Path, busy_timeout_ms: u64) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %db_path.display(), "Opening database");

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_checkpoints (
            batch_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            state TEXT NOT NULL,
            processed_count INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            last_saved_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_patches (
            record_id TEXT PRIMARY KEY,
            fields TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Database tables initialized (batch_checkpoints, record_patches)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = database_path(&dir.path().join("nested"));
        let pool = init_database(&path, 1000).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(tables, vec!["batch_checkpoints", "record_patches"]);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_init_is_repeatable() {
        let pool = init_memory_database().await.unwrap();
        init_tables(&pool).await.unwrap();
    }
}
