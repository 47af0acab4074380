//! Duplicate resolution use case
//!
//! Two phases over a folder's preparing files, both paged by
//! `min(api_page_size, db_page_size)`:
//!
//! 1. [`find_duplicates`](ResolveDuplicatesUseCase::find_duplicates) sends
//!    the name hashes of `Idle` files to the remote duplicate service. Files
//!    with no remote candidate (or only drafts) become `Ready`, the rest
//!    become `PossibleDuplicate`. Every candidate is stored for phase 2.
//! 2. [`check_duplicates`](ResolveDuplicatesUseCase::check_duplicates)
//!    hashes the content of each `PossibleDuplicate` file and compares it
//!    with the stored candidates sharing its name hash. A match makes the
//!    file `Duplicated` and removes it; otherwise it becomes `Ready`.
//!
//! Each page moves all of its files out of the phase's source state, so a
//! second run over unchanged input finds nothing to do.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::BackupConfig;
use crate::domain::{
    newtypes::{ContentHash, FileUri, LinkId},
    BackupDuplicate, BackupFile, BackupFolder, FileState,
};
use crate::hashing::ContentHasher;
use crate::ports::{
    IBackupRepository, IDeviceInfo, IDuplicateService, IHashKeyProvider, ILocalEnumerator,
};

use super::UseCaseResult;

/// Files moved by [`ResolveDuplicatesUseCase::find_duplicates`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOutcome {
    pub ready: u64,
    pub possible_duplicates: u64,
    pub drafts: u64,
}

/// Files moved by [`ResolveDuplicatesUseCase::check_duplicates`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub ready: u64,
    pub duplicated: u64,
    /// Files that vanished from disk and were dropped from tracking
    pub vanished: u64,
}

/// Use case for two-phase duplicate resolution
pub struct ResolveDuplicatesUseCase {
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    duplicate_service: Arc<dyn IDuplicateService + Send + Sync>,
    enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
    keys: Arc<dyn IHashKeyProvider + Send + Sync>,
    device: Arc<dyn IDeviceInfo + Send + Sync>,
    config: BackupConfig,
}

impl ResolveDuplicatesUseCase {
    pub fn new(
        repository: Arc<dyn IBackupRepository + Send + Sync>,
        duplicate_service: Arc<dyn IDuplicateService + Send + Sync>,
        enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
        keys: Arc<dyn IHashKeyProvider + Send + Sync>,
        device: Arc<dyn IDeviceInfo + Send + Sync>,
        config: BackupConfig,
    ) -> Self {
        Self {
            repository,
            duplicate_service,
            enumerator,
            keys,
            device,
            config,
        }
    }

    /// Remote name-hash lookup for every `Idle` file of the folder
    pub async fn find_duplicates(&self, folder: &BackupFolder) -> UseCaseResult<FindOutcome> {
        let user_id = folder.user_id();
        let folder_id = folder.folder_id();
        let batch_size = self.config.batch_size().max(1);
        let client_uids = [self.device.client_uid()];
        let mut outcome = FindOutcome::default();

        loop {
            let page = self
                .repository
                .get_files_in_state(user_id, folder_id, FileState::Idle, batch_size)
                .await?;
            let page_len = page.len();
            if page_len == 0 {
                break;
            }

            let hashes: Vec<_> = page.iter().filter_map(|f| f.hash().cloned()).collect();
            let remote = if hashes.is_empty() {
                Vec::new()
            } else {
                self.duplicate_service
                    .find_duplicates(folder_id, &hashes, &client_uids)
                    .await
                    .context("Remote duplicate lookup failed")?
            };

            let drafts = remote.iter().filter(|d| d.is_draft()).count() as u64;
            let possible: HashSet<_> = remote
                .iter()
                .filter(|d| !d.is_draft())
                .map(|d| d.hash.clone())
                .collect();

            if !remote.is_empty() {
                self.repository.save_duplicates(user_id, &remote).await?;
            }

            let (candidates, ready): (Vec<&BackupFile>, Vec<&BackupFile>) = page
                .iter()
                .partition(|f| f.hash().is_some_and(|h| possible.contains(h)));

            outcome.ready += self
                .repository
                .transition_files(
                    user_id,
                    folder_id,
                    &uris(&ready),
                    FileState::Idle,
                    FileState::Ready,
                )
                .await?;
            outcome.possible_duplicates += self
                .repository
                .transition_files(
                    user_id,
                    folder_id,
                    &uris(&candidates),
                    FileState::Idle,
                    FileState::PossibleDuplicate,
                )
                .await?;
            outcome.drafts += drafts;

            debug!(
                folder_id = %folder_id,
                page = page_len,
                ready = ready.len(),
                possible = candidates.len(),
                drafts,
                "Duplicate lookup page resolved"
            );

            if page_len < batch_size as usize {
                break;
            }
        }

        info!(
            folder_id = %folder_id,
            ready = outcome.ready,
            possible_duplicates = outcome.possible_duplicates,
            drafts = outcome.drafts,
            "Remote duplicate lookup finished"
        );
        Ok(outcome)
    }

    /// Content check for every `PossibleDuplicate` file of the folder
    pub async fn check_duplicates(&self, folder: &BackupFolder) -> UseCaseResult<CheckOutcome> {
        let user_id = folder.user_id();
        let folder_id = folder.folder_id();
        let batch_size = self.config.batch_size().max(1);
        let mut outcome = CheckOutcome::default();
        let mut node_key: Option<Vec<u8>> = None;

        loop {
            let page = self
                .repository
                .get_files_in_state(user_id, folder_id, FileState::PossibleDuplicate, batch_size)
                .await?;
            let page_len = page.len();
            if page_len == 0 {
                break;
            }

            if node_key.is_none() {
                node_key = Some(
                    self.keys
                        .node_key(user_id, folder_id)
                        .await
                        .context("Failed to fetch content hash key")?,
                );
            }
            let key = node_key.as_deref().unwrap_or_default();

            for file in &page {
                let uri = std::slice::from_ref(file.uri());

                let Some(content) = self.content_hash(file.uri(), key).await? else {
                    warn!(folder_id = %folder_id, uri = %file.uri(), "File vanished before content check");
                    outcome.vanished += self.repository.delete_files(user_id, folder_id, uri).await?;
                    continue;
                };

                let candidates = match file.hash() {
                    Some(hash) => {
                        self.repository
                            .get_duplicates_by_hash(user_id, folder_id, hash)
                            .await?
                    }
                    None => Vec::new(),
                };

                match candidates.iter().find(|d| d.matches_content(&content)) {
                    Some(matched) => {
                        let moved = self
                            .repository
                            .transition_files(
                                user_id,
                                folder_id,
                                uri,
                                FileState::PossibleDuplicate,
                                FileState::Duplicated,
                            )
                            .await?;
                        if moved == 0 {
                            continue;
                        }
                        self.discard_duplicate(folder, file, matched, &candidates)
                            .await?;
                        outcome.duplicated += 1;
                    }
                    None => {
                        outcome.ready += self
                            .repository
                            .transition_files(
                                user_id,
                                folder_id,
                                uri,
                                FileState::PossibleDuplicate,
                                FileState::Ready,
                            )
                            .await?;
                    }
                }
            }

            if page_len < batch_size as usize {
                break;
            }
        }

        info!(
            folder_id = %folder_id,
            ready = outcome.ready,
            duplicated = outcome.duplicated,
            vanished = outcome.vanished,
            "Content duplicate check finished"
        );
        Ok(outcome)
    }

    /// Keyed content hash of a local file, `None` if it no longer exists
    async fn content_hash(&self, uri: &FileUri, key: &[u8]) -> UseCaseResult<Option<ContentHash>> {
        let Some(mut stream) = self
            .enumerator
            .open(uri)
            .await
            .with_context(|| format!("Failed to open {uri}"))?
        else {
            return Ok(None);
        };

        let mut hasher = ContentHasher::new(self.config.content_hash_algorithm, key)?;
        while let Some(chunk) = stream
            .next_chunk()
            .await
            .with_context(|| format!("Failed to read {uri}"))?
        {
            hasher.update(&chunk);
        }
        Ok(Some(hasher.finalize()?))
    }

    /// Removes a confirmed duplicate file, the remote row it matched, and
    /// the stale drafts sharing its name hash
    async fn discard_duplicate(
        &self,
        folder: &BackupFolder,
        file: &BackupFile,
        matched: &BackupDuplicate,
        candidates: &[BackupDuplicate],
    ) -> UseCaseResult<()> {
        let user_id = folder.user_id();
        let folder_id = folder.folder_id();

        let drafts: Vec<&BackupDuplicate> = candidates.iter().filter(|d| d.is_draft()).collect();
        if !drafts.is_empty() {
            let links: Vec<LinkId> = drafts.iter().map(|d| d.link_id.clone()).collect();
            self.duplicate_service
                .delete_drafts(folder_id, &links)
                .await
                .context("Failed to delete stale drafts")?;
        }

        let ids: Vec<i64> = drafts
            .iter()
            .copied()
            .chain(std::iter::once(matched))
            .filter_map(|d| d.id)
            .collect();
        self.repository.delete_duplicates(&ids).await?;
        self.repository
            .delete_files(user_id, folder_id, std::slice::from_ref(file.uri()))
            .await?;

        debug!(folder_id = %folder_id, uri = %file.uri(), link_id = %matched.link_id, "File is a duplicate");
        Ok(())
    }
}

fn uris(files: &[&BackupFile]) -> Vec<FileUri> {
    files.iter().map(|f| f.uri().clone()).collect()
}
