//! Folder scan use case
//!
//! Enumerates the files of a folder's bucket modified after the folder's
//! scan watermark, hashes their names, and records them as `Idle` rows in
//! one atomic commit together with the advanced watermark.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::domain::{BackupFile, BackupFolder};
use crate::hashing;
use crate::ports::{IBackupRepository, IHashKeyProvider, ILocalEnumerator};

use super::UseCaseResult;

/// Use case for incremental folder scans
pub struct ScanFolderUseCase {
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
    keys: Arc<dyn IHashKeyProvider + Send + Sync>,
}

impl ScanFolderUseCase {
    pub fn new(
        repository: Arc<dyn IBackupRepository + Send + Sync>,
        enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
        keys: Arc<dyn IHashKeyProvider + Send + Sync>,
    ) -> Self {
        Self {
            repository,
            enumerator,
            keys,
        }
    }

    /// Scans `folder`, continuing upload priorities after the highest one
    /// already assigned for the account; returns the number of new rows
    pub async fn execute(&self, folder: &BackupFolder) -> UseCaseResult<u64> {
        let base = self
            .repository
            .max_upload_priority(folder.user_id())
            .await?
            .map_or(0, |max| max + 1);
        self.scan(folder, base).await
    }

    /// Scans `folder`, assigning priorities sequentially from `priority_base`
    ///
    /// Files are numbered oldest capture first. Nothing is stored unless
    /// the whole pass succeeds; files already tracked keep their row and
    /// priority and are not counted.
    pub async fn scan(&self, folder: &BackupFolder, priority_base: i64) -> UseCaseResult<u64> {
        let since = folder.update_time();
        let mut descriptors = self
            .enumerator
            .list(folder.bucket_id(), since)
            .await
            .with_context(|| format!("Failed to enumerate bucket {}", folder.bucket_id()))?;

        // the watermark is exclusive even if the enumerator is not
        descriptors.retain(|d| since.map_or(true, |s| d.last_modified > s));
        descriptors.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.uri.cmp(&b.uri)));

        if descriptors.is_empty() {
            debug!(folder_id = %folder.folder_id(), "Scan found no new files");
            return Ok(0);
        }

        let key = self
            .keys
            .name_key(folder.user_id(), folder.folder_id())
            .await
            .context("Failed to fetch name hash key")?;

        let mut scanned = folder.clone();
        let mut files = Vec::with_capacity(descriptors.len());
        for (offset, descriptor) in descriptors.into_iter().enumerate() {
            let hash = hashing::name_hash(&key, &descriptor.name)?;
            scanned.advance_update_time(descriptor.last_modified);
            files.push(
                BackupFile::new(
                    folder.folder_id().clone(),
                    folder.bucket_id(),
                    descriptor.uri,
                    descriptor.name,
                    descriptor.mime_type,
                    descriptor.size,
                    descriptor.date,
                    descriptor.last_modified,
                    priority_base + offset as i64,
                )
                .with_hash(hash),
            );
        }

        let inserted = self.repository.commit_scan(&scanned, &files).await?;

        info!(
            folder_id = %folder.folder_id(),
            scanned = files.len(),
            inserted,
            "Folder scan committed"
        );

        Ok(inserted)
    }
}
