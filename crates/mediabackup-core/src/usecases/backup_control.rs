//! Backup control use case
//!
//! Store-side half of the folder control operations: enabling, stopping
//! with an error, retrying, disabling, reacting to a configuration change,
//! reconciling orphaned uploads and dismissing error categories. Task
//! cancellation is left to the caller.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::domain::{
    newtypes::{FolderId, UserId},
    BackupConfiguration, BackupError, BackupErrorType, BackupEvent, BackupFolder, DomainError,
    FileState,
};
use crate::ports::{IBackupRepository, IEventAnnouncer, IUploadSubsystem};

use super::{UseCaseError, UseCaseResult};

/// Use case for folder control operations
pub struct BackupControlUseCase {
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    upload: Arc<dyn IUploadSubsystem + Send + Sync>,
    announcer: Arc<dyn IEventAnnouncer + Send + Sync>,
    config: BackupConfig,
}

impl BackupControlUseCase {
    pub fn new(
        repository: Arc<dyn IBackupRepository + Send + Sync>,
        upload: Arc<dyn IUploadSubsystem + Send + Sync>,
        announcer: Arc<dyn IEventAnnouncer + Send + Sync>,
        config: BackupConfig,
    ) -> Self {
        Self {
            repository,
            upload,
            announcer,
            config,
        }
    }

    /// Starts tracking `folder` with the given configuration
    ///
    /// Enabling an already tracked folder keeps its watermarks and files
    /// and only stores the configuration.
    pub async fn enable(
        &self,
        folder: BackupFolder,
        configuration: BackupConfiguration,
    ) -> UseCaseResult<BackupFolder> {
        let existing = self
            .repository
            .get_folder(folder.user_id(), folder.folder_id())
            .await?;
        let folder = match existing {
            Some(existing) => existing,
            None => {
                self.repository.save_folder(&folder).await?;
                info!(folder_id = %folder.folder_id(), bucket_id = %folder.bucket_id(), "Backup enabled");
                folder
            }
        };
        self.repository.save_configuration(&configuration).await?;
        Ok(folder)
    }

    /// Persists `error`, reverts unconfirmed uploads to `Ready` and
    /// announces the stop
    ///
    /// A `Migration` error also drops the folder's tracked content, since
    /// incremental backup into the old share is no longer possible.
    pub async fn stop(&self, user_id: &UserId, error: BackupError) -> UseCaseResult<()> {
        let folder_id = error.folder_id.clone();
        let error_type = error.error_type;

        self.repository.save_error(user_id, &error).await?;
        let reverted = self.repository.revert_enqueued(user_id, &folder_id).await?;

        if error_type == BackupErrorType::Migration {
            self.repository
                .delete_folder_content(user_id, &folder_id)
                .await?;
        }

        warn!(folder_id = %folder_id, error = %error_type, reverted, "Backup stopped");
        self.announcer.announce(
            user_id,
            BackupEvent::BackupStopped {
                folder_id,
                error: error_type,
            },
        );
        Ok(())
    }

    /// Clears retryable errors and gives every failed file a fresh budget
    ///
    /// Returns the number of files moved back to `Ready`.
    pub async fn retry(&self, user_id: &UserId, folder_id: &FolderId) -> UseCaseResult<u64> {
        if self.repository.get_folder(user_id, folder_id).await?.is_none() {
            return Err(UseCaseError::NotFound(folder_id.clone()));
        }

        let retryable: Vec<BackupErrorType> = BackupErrorType::ALL
            .into_iter()
            .filter(BackupErrorType::is_retryable)
            .collect();
        let cleared = self
            .repository
            .delete_errors(user_id, folder_id, &retryable)
            .await?;
        let reset = self.repository.reset_failed_files(user_id, folder_id).await?;

        info!(folder_id = %folder_id, cleared, reset, "Backup retry requested");
        Ok(reset)
    }

    /// Stops tracking a folder: cancels its pending uploads and deletes it
    pub async fn disable(&self, user_id: &UserId, folder_id: &FolderId) -> UseCaseResult<()> {
        let uris = self.repository.list_file_uris(user_id, folder_id).await?;
        if !uris.is_empty() {
            self.upload
                .cancel(user_id, folder_id, &uris)
                .await
                .with_context(|| format!("Failed to cancel uploads of folder {folder_id}"))?;
        }
        self.repository.delete_folder(user_id, folder_id).await?;
        info!(folder_id = %folder_id, cancelled = uris.len(), "Backup disabled");
        Ok(())
    }

    /// Applies a configuration change
    ///
    /// When the network constraint changed, in-flight uploads are cancelled
    /// and every non-terminal file restarts from `Idle`. Returns true if the
    /// folder was reset.
    pub async fn reconfigure(
        &self,
        previous: &BackupConfiguration,
        current: &BackupConfiguration,
    ) -> UseCaseResult<bool> {
        let user_id = &current.user_id;
        let folder_id = &current.folder_id;
        let reset = previous.requires_reset(current);

        if reset {
            let in_flight: Vec<_> = self
                .repository
                .get_files_in_state(user_id, folder_id, FileState::Enqueued, u32::MAX)
                .await?
                .iter()
                .map(|f| f.uri().clone())
                .collect();
            if !in_flight.is_empty() {
                self.upload
                    .cancel(user_id, folder_id, &in_flight)
                    .await
                    .context("Failed to cancel in-flight uploads")?;
            }
            let moved = self.repository.reset_to_idle(user_id, folder_id).await?;
            info!(
                folder_id = %folder_id,
                from = %previous.network_type,
                to = %current.network_type,
                moved,
                "Network constraint changed, files reset"
            );
        }

        self.repository.save_configuration(current).await?;
        Ok(reset)
    }

    /// Moves uploads left `Enqueued` longer than the configured timeout to
    /// `Failed`, where the retry pass can pick them up
    pub async fn reconcile_stale_enqueued(&self, user_id: &UserId) -> UseCaseResult<u64> {
        let timeout = chrono::Duration::from_std(self.config.enqueued_timeout())
            .map_err(|e| DomainError::ValidationFailed(format!("enqueued timeout: {e}")))?;
        let reconciled = self
            .repository
            .reconcile_stale_enqueued(user_id, Utc::now() - timeout)
            .await?;
        if reconciled > 0 {
            warn!(user_id = %user_id, reconciled, "Stale enqueued uploads marked failed");
        }
        Ok(reconciled)
    }

    /// Hides an error category until its condition clears
    pub async fn dismiss(&self, user_id: &UserId, error_type: BackupErrorType) -> UseCaseResult<()> {
        if !error_type.is_dismissible() {
            return Err(DomainError::ValidationFailed(format!(
                "{error_type} errors cannot be dismissed"
            ))
            .into());
        }
        self.repository.save_dismissal(user_id, error_type).await?;
        info!(user_id = %user_id, error = %error_type, "Error dismissed");
        Ok(())
    }
}
