//! SQLite implementation of IBackupRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! File State Store port defined in mediabackup-core. It handles domain
//! type mapping and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type                         | SQL Type | Strategy                              |
//! |-------------------------------------|----------|---------------------------------------|
//! | UserId, FolderId, FileUri, LinkId   | TEXT     | `.as_str()` / `::new()`               |
//! | NameHash, ContentHash               | TEXT     | lowercase hex via `.as_str()` / `::new()` |
//! | BucketId                            | INTEGER  | `.get()` / `BucketId::new()`          |
//! | u64 sizes and counters              | INTEGER  | checked conversion to/from `i64`      |
//! | DateTime<Utc>                       | TEXT     | RFC 3339, fixed microsecond width     |
//! | FileState, NetworkType, LinkState   | TEXT     | `.as_str()` / `FromStr`               |
//! | BackupErrorType                     | TEXT     | `.as_str()` / `FromStr`               |
//!
//! ## Gated transitions
//!
//! Every state change is an `UPDATE ... WHERE state = <expected>`; the
//! affected row count tells the caller which rows it actually moved.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use mediabackup_core::domain::{
    newtypes::{BucketId, ContentHash, FileUri, FolderId, LinkId, NameHash, UserId},
    BackupConfiguration, BackupDuplicate, BackupError, BackupErrorType, BackupFile, BackupFolder,
    FileState, LinkState, NetworkType,
};
use mediabackup_core::ports::IBackupRepository;

use crate::CacheError;

/// SQLite-based implementation of the File State Store port
///
/// All operations are performed through a connection pool. Multi-row
/// writes run in a transaction.
pub struct SqliteBackupRepository {
    pool: SqlitePool,
}

impl SqliteBackupRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a DateTime<Utc> for storage
///
/// The fixed width keeps text comparison in SQL consistent with time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing without timezone (SQLite default format)
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn to_sql_int(value: u64, field: &str) -> Result<i64, CacheError> {
    i64::try_from(value)
        .map_err(|_| CacheError::SerializationError(format!("{field} out of range: {value}")))
}

fn from_sql_int(value: i64, field: &str) -> Result<u64, CacheError> {
    u64::try_from(value)
        .map_err(|_| CacheError::SerializationError(format!("negative {field}: {value}")))
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn backup_folder_from_row(row: &SqliteRow) -> Result<BackupFolder, CacheError> {
    let user_id: String = row.get("user_id");
    let folder_id: String = row.get("folder_id");
    let bucket_id: i64 = row.get("bucket_id");
    let update_time: Option<String> = row.get("update_time");
    let sync_time: Option<String> = row.get("sync_time");

    Ok(BackupFolder::restore(
        UserId::new(user_id)?,
        FolderId::new(folder_id)?,
        BucketId::new(bucket_id),
        parse_optional_datetime(update_time)?,
        parse_optional_datetime(sync_time)?,
    ))
}

fn backup_file_from_row(row: &SqliteRow) -> Result<BackupFile, CacheError> {
    let folder_id: String = row.get("folder_id");
    let bucket_id: i64 = row.get("bucket_id");
    let uri: String = row.get("uri");
    let name: String = row.get("name");
    let mime_type: String = row.get("mime_type");
    let size: i64 = row.get("size");
    let date: String = row.get("date");
    let last_modified: String = row.get("last_modified");
    let hash: Option<String> = row.get("hash");
    let upload_priority: i64 = row.get("upload_priority");
    let state: String = row.get("state");
    let attempts: i64 = row.get("attempts");

    let attempts = u32::try_from(attempts)
        .map_err(|_| CacheError::SerializationError(format!("invalid attempts: {attempts}")))?;

    Ok(BackupFile::restore(
        FolderId::new(folder_id)?,
        BucketId::new(bucket_id),
        FileUri::new(uri)?,
        name,
        mime_type,
        from_sql_int(size, "size")?,
        parse_datetime(&date)?,
        parse_datetime(&last_modified)?,
        hash.map(NameHash::new).transpose()?,
        upload_priority,
        state.parse::<FileState>()?,
        attempts,
    ))
}

fn backup_duplicate_from_row(row: &SqliteRow) -> Result<BackupDuplicate, CacheError> {
    let id: i64 = row.get("id");
    let folder_id: String = row.get("folder_id");
    let link_id: String = row.get("link_id");
    let hash: String = row.get("hash");
    let content_hash: Option<String> = row.get("content_hash");
    let link_state: String = row.get("link_state");

    let mut duplicate = BackupDuplicate::new(
        FolderId::new(folder_id)?,
        LinkId::new(link_id)?,
        NameHash::new(hash)?,
        content_hash.map(ContentHash::new).transpose()?,
        link_state.parse::<LinkState>()?,
    );
    duplicate.id = Some(id);
    Ok(duplicate)
}

fn backup_error_from_row(row: &SqliteRow) -> Result<BackupError, CacheError> {
    let folder_id: String = row.get("folder_id");
    let error_type: String = row.get("error_type");
    let message: Option<String> = row.get("message");
    let created_at: String = row.get("created_at");

    Ok(BackupError {
        folder_id: FolderId::new(folder_id)?,
        error_type: error_type.parse::<BackupErrorType>()?,
        message,
        created_at: parse_datetime(&created_at)?,
    })
}

// ============================================================================
// IBackupRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IBackupRepository for SqliteBackupRepository {
    // --- Folder operations ---

    async fn save_folder(&self, folder: &BackupFolder) -> anyhow::Result<()> {
        let update_time = folder.update_time().as_ref().map(format_datetime);
        let sync_time = folder.sync_time().as_ref().map(format_datetime);

        // an upsert, not INSERT OR REPLACE: replacing would cascade-delete files
        sqlx::query(
            "INSERT INTO backup_folders (user_id, folder_id, bucket_id, update_time, sync_time) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, folder_id) DO UPDATE SET \
             bucket_id = excluded.bucket_id, \
             update_time = excluded.update_time, \
             sync_time = excluded.sync_time",
        )
        .bind(folder.user_id().as_str())
        .bind(folder.folder_id().as_str())
        .bind(folder.bucket_id().get())
        .bind(&update_time)
        .bind(&sync_time)
        .execute(&self.pool)
        .await?;

        tracing::trace!(folder_id = %folder.folder_id(), "Saved backup folder");
        Ok(())
    }

    async fn get_folder(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Option<BackupFolder>> {
        let row = sqlx::query("SELECT * FROM backup_folders WHERE user_id = ? AND folder_id = ?")
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(backup_folder_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_folders(&self, user_id: &UserId) -> anyhow::Result<Vec<BackupFolder>> {
        let rows = sqlx::query("SELECT * FROM backup_folders WHERE user_id = ? ORDER BY folder_id")
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| backup_folder_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn list_users(&self) -> anyhow::Result<Vec<UserId>> {
        let users: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT user_id FROM backup_folders ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;

        users
            .into_iter()
            .map(|u| UserId::new(u).map_err(anyhow::Error::from))
            .collect()
    }

    async fn delete_folder(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "backup_files",
            "backup_duplicates",
            "backup_errors",
            "backup_configurations",
            "backup_folders",
        ] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE user_id = ? AND folder_id = ?"
            ))
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::trace!(folder_id = %folder_id, "Deleted backup folder");
        Ok(())
    }

    async fn update_sync_time(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE backup_folders SET sync_time = ? WHERE user_id = ? AND folder_id = ?")
            .bind(format_datetime(&at))
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_stale_folders(
        &self,
        user_id: &UserId,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BackupFolder>> {
        let rows = sqlx::query(
            "SELECT * FROM backup_folders \
             WHERE user_id = ? AND (sync_time IS NULL OR sync_time < ?) \
             ORDER BY folder_id",
        )
        .bind(user_id.as_str())
        .bind(format_datetime(&before))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| backup_folder_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    // --- Configuration operations ---

    async fn save_configuration(&self, configuration: &BackupConfiguration) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO backup_configurations (user_id, folder_id, network_type) \
             VALUES (?, ?, ?) \
             ON CONFLICT (user_id, folder_id) DO UPDATE SET network_type = excluded.network_type",
        )
        .bind(configuration.user_id.as_str())
        .bind(configuration.folder_id.as_str())
        .bind(configuration.network_type.as_str())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            folder_id = %configuration.folder_id,
            network_type = %configuration.network_type,
            "Saved backup configuration"
        );
        Ok(())
    }

    async fn get_configuration(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Option<BackupConfiguration>> {
        let network_type: Option<String> = sqlx::query_scalar(
            "SELECT network_type FROM backup_configurations WHERE user_id = ? AND folder_id = ?",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match network_type {
            Some(value) => Ok(Some(BackupConfiguration::new(
                user_id.clone(),
                folder_id.clone(),
                value.parse::<NetworkType>()?,
            ))),
            None => Ok(None),
        }
    }

    // --- File operations ---

    async fn commit_scan(
        &self,
        folder: &BackupFolder,
        files: &[BackupFile],
    ) -> anyhow::Result<u64> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for file in files {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO backup_files \
                 (user_id, folder_id, bucket_id, uri, name, mime_type, size, date, last_modified, \
                  hash, upload_priority, state, attempts, state_changed_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(folder.user_id().as_str())
            .bind(file.folder_id().as_str())
            .bind(file.bucket_id().get())
            .bind(file.uri().as_str())
            .bind(file.name())
            .bind(file.mime_type())
            .bind(to_sql_int(file.size(), "size")?)
            .bind(format_datetime(&file.date()))
            .bind(format_datetime(&file.last_modified()))
            .bind(file.hash().map(NameHash::as_str))
            .bind(file.upload_priority())
            .bind(file.state().as_str())
            .bind(i64::from(file.attempts()))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        sqlx::query("UPDATE backup_folders SET update_time = ? WHERE user_id = ? AND folder_id = ?")
            .bind(folder.update_time().as_ref().map(format_datetime))
            .bind(folder.user_id().as_str())
            .bind(folder.folder_id().as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::trace!(folder_id = %folder.folder_id(), inserted, "Committed scan");
        Ok(inserted)
    }

    async fn max_upload_priority(&self, user_id: &UserId) -> anyhow::Result<Option<i64>> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(upload_priority) FROM backup_files WHERE user_id = ?")
                .bind(user_id.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(max)
    }

    async fn get_file(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uri: &FileUri,
    ) -> anyhow::Result<Option<BackupFile>> {
        let row = sqlx::query(
            "SELECT * FROM backup_files WHERE user_id = ? AND folder_id = ? AND uri = ?",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .bind(uri.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(backup_file_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_files_in_state(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        state: FileState,
        limit: u32,
    ) -> anyhow::Result<Vec<BackupFile>> {
        let rows = sqlx::query(
            "SELECT * FROM backup_files \
             WHERE user_id = ? AND folder_id = ? AND state = ? \
             ORDER BY upload_priority ASC, date ASC, uri ASC \
             LIMIT ?",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .bind(state.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| backup_file_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn list_file_uris(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Vec<FileUri>> {
        let uris: Vec<String> = sqlx::query_scalar(
            "SELECT uri FROM backup_files WHERE user_id = ? AND folder_id = ? \
             ORDER BY upload_priority ASC, uri ASC",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        uris.into_iter()
            .map(|u| FileUri::new(u).map_err(anyhow::Error::from))
            .collect()
    }

    async fn transition_files(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uris: &[FileUri],
        from: FileState,
        to: FileState,
    ) -> anyhow::Result<u64> {
        if !FileState::allows(from, to) {
            return Err(CacheError::TransitionRejected {
                from: from.name().to_string(),
                to: to.name().to_string(),
            }
            .into());
        }
        if uris.is_empty() {
            return Ok(0);
        }

        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut moved = 0;

        for uri in uris {
            let result = sqlx::query(
                "UPDATE backup_files SET \
                 state = ?, \
                 attempts = CASE ? WHEN 'failed' THEN attempts + 1 WHEN 'idle' THEN 0 ELSE attempts END, \
                 state_changed_at = ? \
                 WHERE user_id = ? AND folder_id = ? AND uri = ? AND state = ?",
            )
            .bind(to.as_str())
            .bind(to.as_str())
            .bind(&now)
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .bind(uri.as_str())
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;
            moved += result.rows_affected();
        }

        tx.commit().await?;

        tracing::trace!(
            folder_id = %folder_id,
            from = from.as_str(),
            to = to.as_str(),
            requested = uris.len(),
            moved,
            "Transitioned backup files"
        );
        Ok(moved)
    }

    async fn delete_files(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uris: &[FileUri],
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for uri in uris {
            let result = sqlx::query(
                "DELETE FROM backup_files WHERE user_id = ? AND folder_id = ? AND uri = ?",
            )
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .bind(uri.as_str())
            .execute(&mut *tx)
            .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;

        tracing::trace!(folder_id = %folder_id, deleted, "Deleted backup files");
        Ok(deleted)
    }

    async fn delete_files_in_state(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        state: FileState,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM backup_files WHERE user_id = ? AND folder_id = ? AND state = ?",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_folder_content(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["backup_files", "backup_duplicates"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE user_id = ? AND folder_id = ?"
            ))
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_failed_as_ready(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        bucket_id: BucketId,
        max_attempts: u32,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE backup_files SET state = 'ready', state_changed_at = ? \
             WHERE user_id = ? AND folder_id = ? AND bucket_id = ? \
             AND state = 'failed' AND attempts < ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .bind(bucket_id.get())
        .bind(i64::from(max_attempts))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reset_failed_files(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE backup_files SET state = 'ready', attempts = 0, state_changed_at = ? \
             WHERE user_id = ? AND folder_id = ? AND state = 'failed'",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revert_enqueued(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE backup_files SET state = 'ready', state_changed_at = ? \
             WHERE user_id = ? AND folder_id = ? AND state = 'enqueued'",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reset_to_idle(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE backup_files SET state = 'idle', attempts = 0, state_changed_at = ? \
             WHERE user_id = ? AND folder_id = ? \
             AND state IN ('possible_duplicate', 'ready', 'enqueued', 'failed')",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reconcile_stale_enqueued(
        &self,
        user_id: &UserId,
        older_than: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE backup_files SET state = 'failed', attempts = attempts + 1, state_changed_at = ? \
             WHERE user_id = ? AND state = 'enqueued' AND state_changed_at < ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id.as_str())
        .bind(format_datetime(&older_than))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_files_by_state(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<HashMap<FileState, u64>> {
        let rows = sqlx::query(
            "SELECT state, COUNT(*) AS count FROM backup_files \
             WHERE user_id = ? AND folder_id = ? GROUP BY state",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            let state: String = row.get("state");
            let count: i64 = row.get("count");
            counts.insert(state.parse::<FileState>()?, from_sql_int(count, "count")?);
        }
        Ok(counts)
    }

    // --- Duplicate operations ---

    async fn save_duplicates(
        &self,
        user_id: &UserId,
        duplicates: &[BackupDuplicate],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for duplicate in duplicates {
            sqlx::query(
                "INSERT OR IGNORE INTO backup_duplicates \
                 (user_id, folder_id, link_id, hash, content_hash, link_state) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id.as_str())
            .bind(duplicate.folder_id.as_str())
            .bind(duplicate.link_id.as_str())
            .bind(duplicate.hash.as_str())
            .bind(duplicate.content_hash.as_ref().map(ContentHash::as_str))
            .bind(duplicate.link_state.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::trace!(count = duplicates.len(), "Saved backup duplicates");
        Ok(())
    }

    async fn get_duplicates_by_hash(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        hash: &NameHash,
    ) -> anyhow::Result<Vec<BackupDuplicate>> {
        let rows = sqlx::query(
            "SELECT * FROM backup_duplicates \
             WHERE user_id = ? AND folder_id = ? AND hash = ? ORDER BY id",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .bind(hash.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| backup_duplicate_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn delete_duplicates(&self, ids: &[i64]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM backup_duplicates WHERE id = ?")
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_duplicates_for_folder(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<u64> {
        let result =
            sqlx::query("DELETE FROM backup_duplicates WHERE user_id = ? AND folder_id = ?")
                .bind(user_id.as_str())
                .bind(folder_id.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    // --- Error operations ---

    async fn save_error(&self, user_id: &UserId, error: &BackupError) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO backup_errors (user_id, folder_id, error_type, message, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, folder_id, error_type) DO UPDATE SET \
             message = excluded.message, created_at = excluded.created_at",
        )
        .bind(user_id.as_str())
        .bind(error.folder_id.as_str())
        .bind(error.error_type.as_str())
        .bind(&error.message)
        .bind(format_datetime(&error.created_at))
        .execute(&self.pool)
        .await?;

        tracing::trace!(folder_id = %error.folder_id, error = %error.error_type, "Saved backup error");
        Ok(())
    }

    async fn get_errors(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Vec<BackupError>> {
        let rows = sqlx::query(
            "SELECT * FROM backup_errors WHERE user_id = ? AND folder_id = ? ORDER BY created_at",
        )
        .bind(user_id.as_str())
        .bind(folder_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| backup_error_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn list_errors(&self, user_id: &UserId) -> anyhow::Result<Vec<BackupError>> {
        let rows = sqlx::query(
            "SELECT * FROM backup_errors WHERE user_id = ? ORDER BY folder_id, created_at",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| backup_error_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn delete_errors(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        types: &[BackupErrorType],
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for error_type in types {
            let result = sqlx::query(
                "DELETE FROM backup_errors WHERE user_id = ? AND folder_id = ? AND error_type = ?",
            )
            .bind(user_id.as_str())
            .bind(folder_id.as_str())
            .bind(error_type.as_str())
            .execute(&mut *tx)
            .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    // --- Dismissal operations ---

    async fn save_dismissal(
        &self,
        user_id: &UserId,
        error_type: BackupErrorType,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO backup_dismissals (user_id, error_type, dismissed_at) \
             VALUES (?, ?, ?)",
        )
        .bind(user_id.as_str())
        .bind(error_type.as_str())
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_dismissal(
        &self,
        user_id: &UserId,
        error_type: BackupErrorType,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM backup_dismissals WHERE user_id = ? AND error_type = ?")
            .bind(user_id.as_str())
            .bind(error_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_dismissed(
        &self,
        user_id: &UserId,
        error_type: BackupErrorType,
    ) -> anyhow::Result<bool> {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT error_type FROM backup_dismissals WHERE user_id = ? AND error_type = ?",
        )
        .bind(user_id.as_str())
        .bind(error_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}
