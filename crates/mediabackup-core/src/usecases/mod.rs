//! Use cases (interactors) for the backup engine
//!
//! This module contains the application use cases that orchestrate
//! domain entities and port interfaces. Use cases are thin coordinators
//! that delegate business rules to domain methods and I/O to ports, and
//! commit every step to the state store before moving on.
//!
//! ## Use Cases
//!
//! - [`ScanFolderUseCase`] - Incremental folder scan into `Idle` rows
//! - [`ResolveDuplicatesUseCase`] - Remote name-hash lookup and content check
//! - [`UploadFolderUseCase`] - Quota-aware batch selection and upload outcomes
//! - [`CleanupUseCase`] - Removal of completed rows
//! - [`GetBackupStateUseCase`] - Error/health aggregation
//! - [`BackupControlUseCase`] - Enable, stop, retry, disable, reconfigure, dismiss

use thiserror::Error;

use crate::domain::{newtypes::FolderId, BackupErrorType, DomainError};

pub mod backup_control;
pub mod cleanup;
pub mod get_backup_state;
pub mod resolve_duplicates;
pub mod scan_folder;
pub mod upload_folder;

pub use backup_control::BackupControlUseCase;
pub use cleanup::{CleanupOutcome, CleanupUseCase};
pub use get_backup_state::GetBackupStateUseCase;
pub use resolve_duplicates::{CheckOutcome, FindOutcome, ResolveDuplicatesUseCase};
pub use scan_folder::ScanFolderUseCase;
pub use upload_folder::{group_batch, select_batch, UploadFolderUseCase, UploadGroup, UploadOutcome};

/// Typed result of a use case
#[derive(Debug, Error)]
pub enum UseCaseError {
    /// A domain rule was violated
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A port (storage, network, platform) failed
    #[error(transparent)]
    Port(#[from] anyhow::Error),

    /// The folder's backup must stop with this error
    #[error("Backup stopped: {0}")]
    Stopped(BackupErrorType),

    /// The folder is not (or no longer) backed up
    #[error("Backup folder not found: {0}")]
    NotFound(FolderId),
}

impl UseCaseError {
    /// The error type to persist, if this failure stops the folder
    ///
    /// Port and domain failures are transient from the folder's point of
    /// view: the next pass resumes from the persisted rows.
    pub fn stop_error_type(&self) -> Option<BackupErrorType> {
        match self {
            UseCaseError::Stopped(error_type) => Some(*error_type),
            _ => None,
        }
    }
}

pub type UseCaseResult<T> = Result<T, UseCaseError>;
