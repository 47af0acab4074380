//! MediaBackup Sync - backup orchestration and account supervision
//!
//! Provides:
//! - The per-folder pipeline (scan, duplicate resolution, upload, cleanup)
//! - One long-lived, cancellable task per account
//! - Environment signal publication and live status recomputation
//! - A directory-backed local enumerator
//!
//! ## Modules
//!
//! - [`orchestrator`] - Folder control operations, pipeline passes and the stale sweep
//! - [`supervisor`] - Registry of account tasks driven by account events
//! - [`signals`] - Watch-channel environment signals and the status watcher
//! - [`enumerator`] - Local enumerator adapter over configured directories

pub mod enumerator;
pub mod orchestrator;
pub mod signals;
pub mod supervisor;

use mediabackup_core::domain::newtypes::{FolderId, UserId};
use mediabackup_core::usecases::UseCaseError;
use thiserror::Error;

pub use enumerator::DirectoryEnumerator;
pub use orchestrator::{BackupOrchestrator, BackupPorts, PassOutcome, PassReport};
pub use signals::{SignalHub, StatusWatcher};
pub use supervisor::{AccountEvent, BackupSupervisor};

/// Errors that can occur while orchestrating backups
#[derive(Debug, Error)]
pub enum SyncError {
    /// The account or folder task was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The folder is not backed up
    #[error("Backup folder not found: {0}")]
    FolderNotFound(FolderId),

    /// No task is running for the account
    #[error("No backup task for account {0}")]
    AccountNotRunning(UserId),

    /// A use case failed
    #[error(transparent)]
    UseCase(UseCaseError),

    /// A port called directly by the orchestrator failed
    #[error(transparent)]
    Port(#[from] anyhow::Error),
}

impl From<UseCaseError> for SyncError {
    fn from(e: UseCaseError) -> Self {
        match e {
            UseCaseError::NotFound(folder_id) => SyncError::FolderNotFound(folder_id),
            other => SyncError::UseCase(other),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
