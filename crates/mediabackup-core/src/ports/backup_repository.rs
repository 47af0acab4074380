//! Backup repository port (driven/secondary port)
//!
//! This module defines the interface of the File State Store: the durable
//! record of backup folders, their configurations, per-file lifecycle
//! state, remote duplicate candidates, persisted errors and dismissals.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - The store is the single owner of file state transitions. Every
//!   transition is *gated*: it only applies to rows currently in the
//!   expected source state, and the number of rows actually moved is
//!   returned. Callers treat a short count as "someone else already owns
//!   that row", which is what keeps a file from being enqueued twice.
//! - Moving a row to `Failed` counts one attempt; moving it to `Idle`
//!   clears the attempt counter, mirroring [`BackupFile::transition_to`].
//! - File rows are addressed by `(user, folder, uri)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{
    newtypes::{BucketId, FileUri, FolderId, NameHash, UserId},
    BackupConfiguration, BackupDuplicate, BackupError, BackupErrorType, BackupFile,
    BackupFolder, FileState,
};

/// Port trait for the File State Store
///
/// ## Implementation Notes
///
/// - [`commit_scan`](IBackupRepository::commit_scan) must be atomic: either
///   all rows and the advanced watermark are stored or nothing is.
/// - Inserting a file that already exists for the folder is a no-op; the
///   stored `upload_priority` is never reassigned.
/// - Deleting a folder removes everything attached to it.
#[async_trait::async_trait]
pub trait IBackupRepository: Send + Sync {
    // --- Folder operations ---

    /// Saves a folder (insert or update)
    async fn save_folder(&self, folder: &BackupFolder) -> anyhow::Result<()>;

    /// Retrieves a folder by id
    async fn get_folder(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Option<BackupFolder>>;

    /// Lists every backup folder of an account
    async fn list_folders(&self, user_id: &UserId) -> anyhow::Result<Vec<BackupFolder>>;

    /// Lists accounts that have at least one backup folder
    async fn list_users(&self) -> anyhow::Result<Vec<UserId>>;

    /// Deletes a folder together with its files, duplicates, errors and
    /// configuration
    async fn delete_folder(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<()>;

    /// Records a completed sync pass
    async fn update_sync_time(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Folders whose last sync is older than `before` (or that never synced)
    async fn get_stale_folders(
        &self,
        user_id: &UserId,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BackupFolder>>;

    // --- Configuration operations ---

    /// Saves a folder configuration (insert or update)
    async fn save_configuration(&self, configuration: &BackupConfiguration)
        -> anyhow::Result<()>;

    /// Retrieves the configuration of a folder
    async fn get_configuration(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Option<BackupConfiguration>>;

    // --- File operations ---

    /// Atomically records the result of one scan pass
    ///
    /// Inserts `files` in `Idle` (ignoring rows that already exist) and
    /// stores the folder's advanced `update_time`. Returns the number of
    /// rows actually inserted.
    async fn commit_scan(&self, folder: &BackupFolder, files: &[BackupFile])
        -> anyhow::Result<u64>;

    /// Highest upload priority assigned for the account, if any file exists
    async fn max_upload_priority(&self, user_id: &UserId) -> anyhow::Result<Option<i64>>;

    /// Retrieves a single file
    async fn get_file(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uri: &FileUri,
    ) -> anyhow::Result<Option<BackupFile>>;

    /// Retrieves up to `limit` files of a folder in `state`
    ///
    /// Ordered by `upload_priority`, then capture date, then uri.
    async fn get_files_in_state(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        state: FileState,
        limit: u32,
    ) -> anyhow::Result<Vec<BackupFile>>;

    /// Every file uri tracked for a folder
    async fn list_file_uris(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Vec<FileUri>>;

    /// Moves the given files from `from` to `to`
    ///
    /// Rows not currently in `from` are left untouched. Returns the number
    /// of rows moved.
    async fn transition_files(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uris: &[FileUri],
        from: FileState,
        to: FileState,
    ) -> anyhow::Result<u64>;

    /// Deletes the given files
    async fn delete_files(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uris: &[FileUri],
    ) -> anyhow::Result<u64>;

    /// Deletes every file of a folder in `state`
    async fn delete_files_in_state(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        state: FileState,
    ) -> anyhow::Result<u64>;

    /// Deletes every file and duplicate of a folder, keeping the folder
    async fn delete_folder_content(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<()>;

    /// Retry pass: moves `Failed` files of the folder and bucket whose
    /// attempts are below `max_attempts` back to `Ready`
    async fn mark_failed_as_ready(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        bucket_id: BucketId,
        max_attempts: u32,
    ) -> anyhow::Result<u64>;

    /// Explicit retry: moves every `Failed` file to `Ready` with its
    /// attempts cleared
    async fn reset_failed_files(&self, user_id: &UserId, folder_id: &FolderId)
        -> anyhow::Result<u64>;

    /// Moves every `Enqueued` file of the folder back to `Ready`
    async fn revert_enqueued(&self, user_id: &UserId, folder_id: &FolderId)
        -> anyhow::Result<u64>;

    /// Moves every non-terminal file of the folder to `Idle`
    async fn reset_to_idle(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<u64>;

    /// Moves `Enqueued` files of the account whose state last changed
    /// before `older_than` to `Failed`, counting one attempt
    async fn reconcile_stale_enqueued(
        &self,
        user_id: &UserId,
        older_than: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    /// Counts the files of a folder grouped by state
    async fn count_files_by_state(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<HashMap<FileState, u64>>;

    // --- Duplicate operations ---

    /// Stores remote duplicate candidates, ignoring links already stored
    async fn save_duplicates(
        &self,
        user_id: &UserId,
        duplicates: &[BackupDuplicate],
    ) -> anyhow::Result<()>;

    /// Duplicates of a folder sharing a name hash
    async fn get_duplicates_by_hash(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        hash: &NameHash,
    ) -> anyhow::Result<Vec<BackupDuplicate>>;

    /// Deletes duplicates by row id
    async fn delete_duplicates(&self, ids: &[i64]) -> anyhow::Result<()>;

    /// Deletes every duplicate of a folder
    async fn delete_duplicates_for_folder(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<u64>;

    // --- Error operations ---

    /// Persists an error (one row per folder and type; later ones replace)
    async fn save_error(&self, user_id: &UserId, error: &BackupError) -> anyhow::Result<()>;

    /// Errors persisted for a folder
    async fn get_errors(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
    ) -> anyhow::Result<Vec<BackupError>>;

    /// Errors persisted for every folder of an account
    async fn list_errors(&self, user_id: &UserId) -> anyhow::Result<Vec<BackupError>>;

    /// Deletes errors of the given types for a folder
    async fn delete_errors(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        types: &[BackupErrorType],
    ) -> anyhow::Result<u64>;

    // --- Dismissal operations ---

    /// Records that the user dismissed an error type
    async fn save_dismissal(&self, user_id: &UserId, error_type: BackupErrorType)
        -> anyhow::Result<()>;

    /// Clears a dismissal
    async fn delete_dismissal(
        &self,
        user_id: &UserId,
        error_type: BackupErrorType,
    ) -> anyhow::Result<()>;

    /// Returns true if the user dismissed `error_type`
    async fn is_dismissed(&self, user_id: &UserId, error_type: BackupErrorType)
        -> anyhow::Result<bool>;
}
