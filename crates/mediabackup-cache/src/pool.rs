//! SQLite pool for the File State Store
//!
//! Schema changes are numbered SQL scripts applied in order. The version a
//! database has reached lives in SQLite's `user_version` header field, so
//! each script runs once per database and a database written by a newer
//! build is refused rather than misread.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use mediabackup_core::config::StorageConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Schema scripts; the script at index `i` brings a database to version `i + 1`
const MIGRATIONS: &[&str] = &[include_str!("migrations/20260301_initial.sql")];

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Connection pool over a migrated state store
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the store at `db_path`, creating the file and its parent
    /// directories on first use
    ///
    /// File databases use WAL journaling so status readers never block the
    /// pipeline's writes.
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` if the file cannot be opened, and
    /// `CacheError::MigrationFailed` if the schema cannot be brought to
    /// [`SCHEMA_VERSION`].
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = Self::open(options, SqlitePoolOptions::new().max_connections(5)).await?;

        tracing::info!(path = %db_path.display(), version = SCHEMA_VERSION, "State store opened");
        Ok(pool)
    }

    /// Opens the store named by the `storage` configuration section
    pub async fn from_config(storage: &StorageConfig) -> Result<Self, CacheError> {
        Self::new(&storage.database).await
    }

    /// A private store for tests
    ///
    /// An in-memory database lives exactly as long as its connection, so
    /// the pool holds a single connection that never expires.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::open(options, pool_options).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn open(
        options: SqliteConnectOptions,
        pool_options: SqlitePoolOptions,
    ) -> Result<Self, CacheError> {
        // folder deletion cascades to files, configurations and errors
        let options = options
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("Failed to open state store: {e}")))?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }
}

fn migration_error(version: i64) -> impl Fn(sqlx::Error) -> CacheError {
    move |e| CacheError::MigrationFailed(format!("Schema version {version}: {e}"))
}

/// Applies every script past the database's current version, each in its
/// own transaction together with the version bump
async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(migration_error(0))?;
    if current > SCHEMA_VERSION {
        return Err(CacheError::MigrationFailed(format!(
            "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    for (index, script) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
        let version = index as i64 + 1;
        let mut tx = pool.begin().await.map_err(migration_error(version))?;
        sqlx::raw_sql(script)
            .execute(&mut *tx)
            .await
            .map_err(migration_error(version))?;
        // PRAGMA statements take no bound parameters
        let bump = format!("PRAGMA user_version = {version}");
        sqlx::raw_sql(&bump)
            .execute(&mut *tx)
            .await
            .map_err(migration_error(version))?;
        tx.commit().await.map_err(migration_error(version))?;
        tracing::debug!(version, "Schema migration applied");
    }
    Ok(())
}
