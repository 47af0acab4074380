//! CLI command implementations

pub mod config;
pub mod dismiss;
pub mod errors;
pub mod folders;
pub mod reconcile;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use mediabackup_cache::{DatabasePool, SqliteBackupRepository};
use mediabackup_core::config::Config;
use mediabackup_core::domain::newtypes::UserId;
use mediabackup_core::ports::IBackupRepository;

use crate::output::{Output, OutputFormat};

/// Settings shared by every command
pub struct CliContext {
    pub format: OutputFormat,
    pub config: Config,
    pub config_path: PathBuf,
}

impl CliContext {
    pub fn output(&self) -> Output {
        Output::new(self.format)
    }

    /// Opens the state store, or reports that none exists yet
    pub async fn open_repository(&self) -> Result<Option<SqliteBackupRepository>> {
        let db_path = &self.config.storage.database;
        if !db_path.exists() {
            self.output().problem(&format!(
                "No state database at {}. Enable a backup folder first.",
                db_path.display()
            ));
            return Ok(None);
        }

        let pool = DatabasePool::from_config(&self.config.storage)
            .await
            .context("Failed to open database")?;
        Ok(Some(SqliteBackupRepository::new(pool.pool().clone())))
    }
}

/// The accounts a command applies to: `user` alone, or every account
/// with tracked folders
pub async fn resolve_users(
    repository: &dyn IBackupRepository,
    user: Option<&str>,
) -> Result<Vec<UserId>> {
    match user {
        Some(user) => Ok(vec![UserId::new(user).context("Invalid user id")?]),
        None => repository
            .list_users()
            .await
            .context("Failed to list accounts"),
    }
}

/// Timestamp for human output
pub fn format_time(time: Option<chrono::DateTime<chrono::Utc>>, missing: &str) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| missing.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_time() {
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(format_time(Some(time), "never"), "2024-03-01 09:30:00 UTC");
        assert_eq!(format_time(None, "never"), "never");
    }

    #[tokio::test]
    async fn test_resolve_users() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let repo = SqliteBackupRepository::new(pool.pool().clone());

        assert!(resolve_users(&repo, None).await.unwrap().is_empty());
        let users = resolve_users(&repo, Some("user-1")).await.unwrap();
        assert_eq!(users, vec![UserId::new("user-1").unwrap()]);
        assert!(resolve_users(&repo, Some(" ")).await.is_err());
    }
}
