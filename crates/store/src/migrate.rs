//! Upgrade of databases written by earlier releases.
//!
//! A snapshot is written to `backups/database_backup_<YYYYmmdd_HHMMSS>.db`
//! through SQLite itself (`VACUUM INTO`), so commits still sitting in the WAL
//! of a running server are included. Opening a [`SqliteStore`] then creates
//! the `chats` table and adds `history.chat_id` where missing. Running it
//! twice is harmless.

use crate::sqlite::SqliteStore;
use chrono::Utc;
use crabai_core::error::StoreError;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tracing::info;

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Where the pre-migration copy was written, if the database existed.
    pub backup: Option<PathBuf>,
    /// `history.chat_id` had to be added.
    pub added_chat_id: bool,
}

/// Back up and upgrade the database at `db_path`.
///
/// Backups go into `backup_dir`, created on demand.
pub async fn migrate_database(db_path: &Path, backup_dir: &Path) -> Result<MigrationReport, StoreError> {
    let backup = if tokio::fs::try_exists(db_path).await.unwrap_or(false) {
        Some(backup_database(db_path, backup_dir).await?)
    } else {
        info!("No database at {}, creating a fresh one", db_path.display());
        None
    };

    let store = SqliteStore::open(db_path, 1).await?;
    let report = MigrationReport {
        backup,
        added_chat_id: store.schema_report().added_chat_id,
    };

    info!(
        added_chat_id = report.added_chat_id,
        "Database migration complete"
    );
    Ok(report)
}

async fn backup_database(db_path: &Path, backup_dir: &Path) -> Result<PathBuf, StoreError> {
    tokio::fs::create_dir_all(backup_dir)
        .await
        .map_err(|e| StoreError::Storage(format!("Create {}: {e}", backup_dir.display())))?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let target = backup_dir.join(format!("database_backup_{stamp}.db"));

    let mut conn = SqliteConnectOptions::new()
        .filename(db_path)
        .connect()
        .await
        .map_err(|e| StoreError::Storage(format!("Open {} for backup: {e}", db_path.display())))?;
    sqlx::query("VACUUM INTO ?1")
        .bind(target.to_string_lossy().into_owned())
        .execute(&mut conn)
        .await
        .map_err(|e| StoreError::Storage(format!("Backup to {}: {e}", target.display())))?;
    conn.close()
        .await
        .map_err(|e| StoreError::Storage(format!("Close backup connection: {e}")))?;

    info!("Created backup at {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn write_legacy_db(path: &Path) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true))
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             username TEXT UNIQUE NOT NULL, password_hash TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE history (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER, \
             query TEXT, result TEXT, timestamp DATETIME DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn backs_up_then_upgrades() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("database.db");
        let backups = dir.path().join("backups");
        write_legacy_db(&db).await;

        let report = migrate_database(&db, &backups).await.unwrap();
        assert!(report.added_chat_id);
        let backup = report.backup.unwrap();
        assert!(backup.exists());
        let file_name = backup.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("database_backup_"));
        assert!(file_name.ends_with(".db"));
    }

    #[tokio::test]
    async fn backup_includes_rows_of_a_store_still_open() {
        use crabai_core::store::RowStore;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("database.db");
        let live = SqliteStore::open(&db, 2).await.unwrap();
        for name in ["alice", "bob", "carol"] {
            live.create_user(name, "hash").await.unwrap();
        }

        let report = migrate_database(&db, &dir.path().join("backups")).await.unwrap();
        let backup = SqliteStore::open(&report.backup.unwrap(), 1).await.unwrap();
        for name in ["alice", "bob", "carol"] {
            assert!(backup.find_user(name).await.unwrap().is_some(), "{name} missing");
        }
        drop(live);
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("database.db");
        write_legacy_db(&db).await;

        migrate_database(&db, &dir.path().join("b1")).await.unwrap();
        let again = migrate_database(&db, &dir.path().join("b2")).await.unwrap();
        assert!(!again.added_chat_id);
        assert!(again.backup.is_some());
    }

    #[tokio::test]
    async fn missing_database_is_created_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("fresh.db");

        let report = migrate_database(&db, &dir.path().join("backups")).await.unwrap();
        assert_eq!(report.backup, None);
        assert!(!report.added_chat_id);
        assert!(db.exists());
    }
}
