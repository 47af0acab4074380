//! Upload scheduling use case
//!
//! Selects `Ready` files of a folder into upload batches under two bounds:
//! the number of files already in flight (`upload_limit_threshold`) and the
//! device space left above `reserved_left_space`. Selection is a strict
//! prefix of the priority order: the first file that would overflow the
//! space budget ends the batch, so a later small file never jumps ahead of
//! an earlier large one.
//!
//! Upload outcomes reported by the upload subsystem are recorded here as
//! well, gated on the file still being `Enqueued`.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::domain::{
    newtypes::{FileUri, FolderId, UserId},
    BackupErrorType, BackupFile, BackupFolder, FileState,
};
use crate::ports::{CacheOption, IBackupRepository, IDeviceInfo, IUploadSubsystem, UploadFileDescriptor};

use super::cleanup::{CleanupOutcome, CleanupUseCase};
use super::{UseCaseError, UseCaseResult};

// ============================================================================
// Batch selection (pure)
// ============================================================================

/// Longest prefix of `ready` whose total size fits in `usable_space`
pub fn select_batch(ready: &[BackupFile], usable_space: u64) -> &[BackupFile] {
    let mut total: u64 = 0;
    let mut end = 0;
    for file in ready {
        match total.checked_add(file.size()) {
            Some(next) if next <= usable_space => {
                total = next;
                end += 1;
            }
            _ => break,
        }
    }
    &ready[..end]
}

/// One upload call: files sharing a priority and a cache option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadGroup {
    pub priority: i64,
    pub cache_option: CacheOption,
    pub files: Vec<UploadFileDescriptor>,
}

impl UploadGroup {
    pub fn uris(&self) -> Vec<FileUri> {
        self.files.iter().map(|f| f.uri.clone()).collect()
    }
}

/// Splits a selected batch into upload calls
///
/// Groups follow the batch order: by priority band, then by cache option.
/// The first `thumbnail_count` files of the batch are uploaded with
/// [`CacheOption::ThumbnailDefault`], the rest with [`CacheOption::None`].
pub fn group_batch(selected: &[BackupFile], thumbnail_count: usize) -> Vec<UploadGroup> {
    let mut groups: Vec<UploadGroup> = Vec::new();
    for (index, file) in selected.iter().enumerate() {
        let cache_option = if index < thumbnail_count {
            CacheOption::ThumbnailDefault
        } else {
            CacheOption::None
        };
        match groups.last_mut() {
            Some(group)
                if group.priority == file.upload_priority() && group.cache_option == cache_option =>
            {
                group.files.push(file.into());
            }
            _ => groups.push(UploadGroup {
                priority: file.upload_priority(),
                cache_option,
                files: vec![file.into()],
            }),
        }
    }
    groups
}

// ============================================================================
// UploadFolderUseCase
// ============================================================================

/// Result of one scheduling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Too many files already in flight
    Throttled { in_flight: u64 },
    /// Files handed to the upload subsystem and marked `Enqueued`
    Enqueued { files: u64, bytes: u64 },
    /// No `Ready` file was left, cleanup ran
    Drained(CleanupOutcome),
}

/// Use case for `uploadFolder` and upload outcome recording
pub struct UploadFolderUseCase {
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    upload: Arc<dyn IUploadSubsystem + Send + Sync>,
    device: Arc<dyn IDeviceInfo + Send + Sync>,
    cleanup: Arc<CleanupUseCase>,
    config: BackupConfig,
}

impl UploadFolderUseCase {
    pub fn new(
        repository: Arc<dyn IBackupRepository + Send + Sync>,
        upload: Arc<dyn IUploadSubsystem + Send + Sync>,
        device: Arc<dyn IDeviceInfo + Send + Sync>,
        cleanup: Arc<CleanupUseCase>,
        config: BackupConfig,
    ) -> Self {
        Self {
            repository,
            upload,
            device,
            cleanup,
            config,
        }
    }

    /// Runs one scheduling pass for `folder`
    ///
    /// # Errors
    ///
    /// Returns `UseCaseError::Stopped(DriveStorage)` when `Ready` files
    /// remain but not even the first one fits in the usable space.
    pub async fn execute(&self, folder: &BackupFolder) -> UseCaseResult<UploadOutcome> {
        let user_id = folder.user_id();
        let folder_id = folder.folder_id();

        let histogram = self.repository.count_files_by_state(user_id, folder_id).await?;
        let in_flight = histogram.get(&FileState::Enqueued).copied().unwrap_or(0);
        let count = i64::from(self.config.upload_limit_threshold) - in_flight as i64;

        let retried = self
            .repository
            .mark_failed_as_ready(
                user_id,
                folder_id,
                folder.bucket_id(),
                self.config.backup_max_attempts,
            )
            .await?;
        if retried > 0 {
            debug!(folder_id = %folder_id, retried, "Failed files moved back to ready");
        }

        if count <= 0 {
            debug!(folder_id = %folder_id, in_flight, "Upload limit reached");
            return Ok(UploadOutcome::Throttled { in_flight });
        }

        let available = self
            .device
            .available_bytes()
            .await
            .context("Failed to query available device space")?;
        let usable_space = available.saturating_sub(self.config.reserved_left_space_bytes());

        let ready = self
            .repository
            .get_files_in_state(
                user_id,
                folder_id,
                FileState::Ready,
                u32::try_from(count).unwrap_or(u32::MAX),
            )
            .await?;

        if ready.is_empty() {
            let cleaned = self.cleanup.execute(folder).await?;
            return Ok(UploadOutcome::Drained(cleaned));
        }

        let selected = select_batch(&ready, usable_space);
        if selected.is_empty() {
            warn!(
                folder_id = %folder_id,
                usable_space,
                next_size = ready[0].size(),
                "Not enough device space for the next upload"
            );
            return Err(UseCaseError::Stopped(BackupErrorType::DriveStorage));
        }

        let thumbnail_count = if available > self.config.thumbnail_storage_threshold_bytes() {
            self.config.thumbnail_cache_limit as usize
        } else {
            0
        };

        let mut enqueued = 0;
        for group in group_batch(selected, thumbnail_count) {
            self.upload
                .upload(
                    user_id,
                    folder_id,
                    &group.files,
                    group.cache_option,
                    group.priority,
                    true,
                )
                .await
                .with_context(|| format!("Upload submission failed for folder {folder_id}"))?;

            // each accepted group is committed before the next is submitted
            let uris = group.uris();
            let moved = self
                .repository
                .transition_files(user_id, folder_id, &uris, FileState::Ready, FileState::Enqueued)
                .await?;
            if moved < uris.len() as u64 {
                warn!(
                    folder_id = %folder_id,
                    expected = uris.len(),
                    moved,
                    "Some files left ready state before they were enqueued"
                );
            }
            enqueued += moved;
        }

        let bytes: u64 = selected.iter().map(BackupFile::size).sum();
        info!(folder_id = %folder_id, files = enqueued, bytes, "Upload batch enqueued");
        Ok(UploadOutcome::Enqueued {
            files: enqueued,
            bytes,
        })
    }

    /// Records a confirmed upload; returns false if the file was not enqueued
    pub async fn record_upload_success(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uri: &FileUri,
    ) -> UseCaseResult<bool> {
        let moved = self
            .repository
            .transition_files(
                user_id,
                folder_id,
                std::slice::from_ref(uri),
                FileState::Enqueued,
                FileState::Complete,
            )
            .await?;
        if moved == 0 {
            debug!(folder_id = %folder_id, uri = %uri, "Ignoring success for a file that is not enqueued");
            return Ok(false);
        }
        self.repository
            .update_sync_time(user_id, folder_id, Utc::now())
            .await?;
        Ok(true)
    }

    /// Records a failed upload; returns false if the file was not enqueued
    pub async fn record_upload_failure(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uri: &FileUri,
    ) -> UseCaseResult<bool> {
        let moved = self
            .repository
            .transition_files(
                user_id,
                folder_id,
                std::slice::from_ref(uri),
                FileState::Enqueued,
                FileState::Failed,
            )
            .await?;
        if moved > 0 {
            warn!(folder_id = %folder_id, uri = %uri, "Upload failed");
        }
        Ok(moved > 0)
    }
}
