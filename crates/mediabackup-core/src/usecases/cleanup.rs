//! Cleanup of a completed backup

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{BackupCounts, BackupEvent, BackupFolder, FileState};
use crate::ports::{IBackupRepository, IEventAnnouncer};

use super::UseCaseResult;

/// Result of a cleanup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The folder was fully backed up; `removed` rows were deleted
    Completed { removed: u64 },
    /// Work remains; nothing was deleted
    Incomplete(BackupCounts),
}

/// Use case for `cleanUpCompleteBackup`
pub struct CleanupUseCase {
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    announcer: Arc<dyn IEventAnnouncer + Send + Sync>,
}

impl CleanupUseCase {
    pub fn new(
        repository: Arc<dyn IBackupRepository + Send + Sync>,
        announcer: Arc<dyn IEventAnnouncer + Send + Sync>,
    ) -> Self {
        Self {
            repository,
            announcer,
        }
    }

    /// Deletes completed rows once nothing is pending, preparing or failed
    pub async fn execute(&self, folder: &BackupFolder) -> UseCaseResult<CleanupOutcome> {
        let user_id = folder.user_id();
        let folder_id = folder.folder_id();

        let histogram = self.repository.count_files_by_state(user_id, folder_id).await?;
        let counts = BackupCounts::from_state_counts(&histogram);

        if !counts.is_backup_complete() {
            debug!(
                folder_id = %folder_id,
                total = counts.total,
                pending = counts.pending,
                preparing = counts.preparing,
                failed = counts.failed,
                "Backup not complete, keeping rows"
            );
            return Ok(CleanupOutcome::Incomplete(counts));
        }

        let mut removed = self
            .repository
            .delete_files_in_state(user_id, folder_id, FileState::Complete)
            .await?;
        // left behind by an interrupted duplicate check
        removed += self
            .repository
            .delete_files_in_state(user_id, folder_id, FileState::Duplicated)
            .await?;
        self.repository
            .delete_duplicates_for_folder(user_id, folder_id)
            .await?;

        info!(folder_id = %folder_id, removed, "Backup complete");
        self.announcer.announce(
            user_id,
            BackupEvent::BackupCompleted {
                folder_id: folder_id.clone(),
            },
        );

        Ok(CleanupOutcome::Completed { removed })
    }
}
