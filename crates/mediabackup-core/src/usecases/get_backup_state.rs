//! Error/health aggregation use case (`GetBackupState`)
//!
//! Gathers a [`StatusSnapshot`] for a folder (file counts, persisted errors,
//! configuration, environment signals, dismissals) and hands it to the pure
//! [`reduce_status`] reducer. Callers that want a live view re-run this
//! whenever a signal or the store changes.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    newtypes::{FolderId, UserId},
    reduce_status, BackupCounts, BackupErrorType, BackupFolder, BackupState, StatusSnapshot,
};
use crate::ports::{IBackupRepository, IEnvironmentSignals, ILocalEnumerator};

use super::UseCaseResult;

/// Use case for the aggregated backup state of a folder
pub struct GetBackupStateUseCase {
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
    signals: Arc<dyn IEnvironmentSignals + Send + Sync>,
}

impl GetBackupStateUseCase {
    pub fn new(
        repository: Arc<dyn IBackupRepository + Send + Sync>,
        enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
        signals: Arc<dyn IEnvironmentSignals + Send + Sync>,
    ) -> Self {
        Self {
            repository,
            enumerator,
            signals,
        }
    }

    /// Aggregated state of one folder
    pub async fn execute(&self, user_id: &UserId, folder_id: &FolderId) -> UseCaseResult<BackupState> {
        match self.repository.get_folder(user_id, folder_id).await? {
            Some(folder) => self.enabled_state(&folder).await,
            None => self.disabled_state().await,
        }
    }

    /// Aggregated state of every folder of an account
    pub async fn execute_all(&self, user_id: &UserId) -> UseCaseResult<Vec<BackupState>> {
        let folders = self.repository.list_folders(user_id).await?;
        let mut states = Vec::with_capacity(folders.len());
        for folder in &folders {
            states.push(self.enabled_state(folder).await?);
        }
        Ok(states)
    }

    async fn disabled_state(&self) -> UseCaseResult<BackupState> {
        let has_default_bucket = self.enumerator.default_bucket().await?.is_some();
        Ok(BackupState::Disabled { has_default_bucket })
    }

    async fn enabled_state(&self, folder: &BackupFolder) -> UseCaseResult<BackupState> {
        let user_id = folder.user_id();
        let folder_id = folder.folder_id();

        let network_type = self
            .repository
            .get_configuration(user_id, folder_id)
            .await?
            .map(|c| c.network_type)
            .unwrap_or_default();
        let histogram = self.repository.count_files_by_state(user_id, folder_id).await?;
        let persisted_errors = self
            .repository
            .get_errors(user_id, folder_id)
            .await?
            .into_iter()
            .map(|e| e.error_type)
            .collect();

        let environment = self.signals.snapshot();
        let mut background_dismissed = self
            .repository
            .is_dismissed(user_id, BackupErrorType::BackgroundRestrictions)
            .await?;
        if background_dismissed && !environment.background_restricted {
            // the condition cleared, a later restriction is shown again
            self.repository
                .delete_dismissal(user_id, BackupErrorType::BackgroundRestrictions)
                .await?;
            background_dismissed = false;
            debug!(user_id = %user_id, "Background restriction dismissal cleared");
        }

        let status = reduce_status(&StatusSnapshot {
            counts: BackupCounts::from_state_counts(&histogram),
            network_type,
            environment,
            background_dismissed,
            persisted_errors,
        });

        Ok(BackupState::Enabled {
            folder_id: folder_id.clone(),
            bucket_id: folder.bucket_id(),
            network_type,
            status,
        })
    }
}
