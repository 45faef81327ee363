//! `crabai migrate`: Upgrade a database written by an older version.

use crabai_config::AppConfig;
use std::path::{Path, PathBuf};

/// Backups go next to the database, in `backups/`.
fn backup_dir_for(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("backups")
}

pub async fn run(database: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = match database {
        Some(path) => path,
        None => AppConfig::load()
            .map_err(|e| format!("Failed to load config: {e}"))?
            .database_path(),
    };

    println!("🔄 Migrating {}", db_path.display());

    let report = crabai_store::migrate_database(&db_path, &backup_dir_for(&db_path)).await?;

    match &report.backup {
        Some(backup) => println!("✅ Backup written to {}", backup.display()),
        None => println!("  No existing database, created a fresh one"),
    }
    if report.added_chat_id {
        println!("✅ Added chat_id column to history");
    } else {
        println!("  Schema already up to date");
    }
    println!("🎉 Migration complete.");

    Ok(())
}
