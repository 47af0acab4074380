//! MediaBackup Cache - File State Store persistence
//!
//! SQLite-based storage for:
//! - Backup folders and their scan/sync watermarks
//! - Per-file backup state, attempts and upload priority
//! - Remote duplicate candidates
//! - Persisted backup errors and dismissals
//!
//! ## Architecture
//!
//! This crate implements the `IBackupRepository` port from `mediabackup-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteBackupRepository`] - Full `IBackupRepository` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use mediabackup_cache::{DatabasePool, SqliteBackupRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/mediabackup/state.db")).await?;
//! let repo = SqliteBackupRepository::new(pool.pool().clone());
//! // Use repo as IBackupRepository...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteBackupRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped to or from a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A state transition the file state machine does not allow
    #[error("Transition from {from} to {to} is not allowed")]
    TransitionRejected { from: String, to: String },
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<mediabackup_core::domain::DomainError> for CacheError {
    fn from(e: mediabackup_core::domain::DomainError) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
