//! Integration tests for SqliteBackupRepository
//!
//! Every test gets a fresh in-memory database.

use chrono::{Duration, TimeZone, Utc};

use mediabackup_cache::{DatabasePool, SqliteBackupRepository};
use mediabackup_core::domain::{
    newtypes::{BucketId, ContentHash, FileUri, FolderId, LinkId, NameHash, UserId},
    BackupConfiguration, BackupDuplicate, BackupError, BackupErrorType, BackupFile, BackupFolder,
    FileState, LinkState, NetworkType,
};
use mediabackup_core::ports::IBackupRepository;

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> SqliteBackupRepository {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteBackupRepository::new(pool.pool().clone())
}

fn user() -> UserId {
    UserId::new("user-1").unwrap()
}

fn folder_id() -> FolderId {
    FolderId::new("photos").unwrap()
}

fn hash(byte: char) -> NameHash {
    NameHash::new(byte.to_string().repeat(64)).unwrap()
}

fn content(byte: char) -> ContentHash {
    ContentHash::new(byte.to_string().repeat(64)).unwrap()
}

async fn create_folder(repo: &SqliteBackupRepository) -> BackupFolder {
    let folder = BackupFolder::new(user(), folder_id(), BucketId::new(7));
    repo.save_folder(&folder).await.unwrap();
    folder
}

fn file(uri: &str, priority: i64, size: u64) -> BackupFile {
    let date = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(priority);
    BackupFile::new(
        folder_id(),
        BucketId::new(7),
        FileUri::new(uri).unwrap(),
        format!("{uri}.jpg"),
        "image/jpeg",
        size,
        date,
        date,
        priority,
    )
    .with_hash(hash('a'))
}

fn uris(values: &[&str]) -> Vec<FileUri> {
    values.iter().map(|v| FileUri::new(*v).unwrap()).collect()
}

/// Scans `files` into the store and moves them all to `state` via legal hops
async fn seed(repo: &SqliteBackupRepository, folder: &BackupFolder, files: &[BackupFile], state: FileState) {
    repo.commit_scan(folder, files).await.unwrap();
    let all: Vec<FileUri> = files.iter().map(|f| f.uri().clone()).collect();
    let path: &[FileState] = match state {
        FileState::Idle => &[],
        FileState::Ready => &[FileState::Ready],
        FileState::Enqueued => &[FileState::Ready, FileState::Enqueued],
        FileState::Complete => &[FileState::Ready, FileState::Enqueued, FileState::Complete],
        FileState::Failed => &[FileState::Ready, FileState::Enqueued, FileState::Failed],
        FileState::PossibleDuplicate => &[FileState::PossibleDuplicate],
        FileState::Duplicated => &[FileState::PossibleDuplicate, FileState::Duplicated],
    };
    let mut from = FileState::Idle;
    for &to in path {
        repo.transition_files(&user(), &folder_id(), &all, from, to)
            .await
            .unwrap();
        from = to;
    }
}

// ============================================================================
// Folder tests
// ============================================================================

#[tokio::test]
async fn test_save_and_get_folder() {
    let repo = setup().await;
    create_folder(&repo).await;

    let folder = repo.get_folder(&user(), &folder_id()).await.unwrap().unwrap();
    assert_eq!(folder.bucket_id(), BucketId::new(7));
    assert!(folder.update_time().is_none());
    assert!(folder.sync_time().is_none());

    let other = FolderId::new("missing").unwrap();
    assert!(repo.get_folder(&user(), &other).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resaving_folder_keeps_its_files() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    repo.commit_scan(&folder, &[file("a", 0, 10)]).await.unwrap();

    repo.save_folder(&folder).await.unwrap();

    let uris = repo.list_file_uris(&user(), &folder_id()).await.unwrap();
    assert_eq!(uris.len(), 1);
}

#[tokio::test]
async fn test_list_users_and_folders() {
    let repo = setup().await;
    create_folder(&repo).await;
    let second = BackupFolder::new(user(), FolderId::new("videos").unwrap(), BucketId::new(8));
    repo.save_folder(&second).await.unwrap();
    let other_user = UserId::new("user-2").unwrap();
    repo.save_folder(&BackupFolder::new(other_user.clone(), folder_id(), BucketId::new(7)))
        .await
        .unwrap();

    let folders = repo.list_folders(&user()).await.unwrap();
    assert_eq!(folders.len(), 2);
    assert_eq!(repo.list_users().await.unwrap(), vec![user(), other_user]);
}

#[tokio::test]
async fn test_stale_folders() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    let now = Utc::now();

    // never synced counts as stale
    let stale = repo.get_stale_folders(&user(), now).await.unwrap();
    assert_eq!(stale.len(), 1);

    repo.update_sync_time(&user(), folder.folder_id(), now).await.unwrap();
    let stale = repo
        .get_stale_folders(&user(), now - Duration::hours(1))
        .await
        .unwrap();
    assert!(stale.is_empty());

    let stale = repo
        .get_stale_folders(&user(), now + Duration::milliseconds(1))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
}

#[tokio::test]
async fn test_delete_folder_removes_everything() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    repo.save_configuration(&BackupConfiguration::new(user(), folder_id(), NetworkType::Connected))
        .await
        .unwrap();
    repo.commit_scan(&folder, &[file("a", 0, 10)]).await.unwrap();
    repo.save_error(&user(), &BackupError::new(folder_id(), BackupErrorType::DriveStorage))
        .await
        .unwrap();
    repo.save_duplicates(
        &user(),
        &[BackupDuplicate::new(
            folder_id(),
            LinkId::new("link-1").unwrap(),
            hash('a'),
            None,
            LinkState::Draft,
        )],
    )
    .await
    .unwrap();

    repo.delete_folder(&user(), &folder_id()).await.unwrap();

    assert!(repo.get_folder(&user(), &folder_id()).await.unwrap().is_none());
    assert!(repo.get_configuration(&user(), &folder_id()).await.unwrap().is_none());
    assert!(repo.list_file_uris(&user(), &folder_id()).await.unwrap().is_empty());
    assert!(repo.get_errors(&user(), &folder_id()).await.unwrap().is_empty());
    assert!(repo
        .get_duplicates_by_hash(&user(), &folder_id(), &hash('a'))
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Configuration tests
// ============================================================================

#[tokio::test]
async fn test_configuration_upsert() {
    let repo = setup().await;
    create_folder(&repo).await;

    repo.save_configuration(&BackupConfiguration::new(user(), folder_id(), NetworkType::Unmetered))
        .await
        .unwrap();
    repo.save_configuration(&BackupConfiguration::new(user(), folder_id(), NetworkType::Connected))
        .await
        .unwrap();

    let config = repo.get_configuration(&user(), &folder_id()).await.unwrap().unwrap();
    assert_eq!(config.network_type, NetworkType::Connected);
}

// ============================================================================
// Scan and file tests
// ============================================================================

#[tokio::test]
async fn test_commit_scan_inserts_and_advances_watermark() {
    let repo = setup().await;
    let mut folder = create_folder(&repo).await;
    let observed = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
    folder.advance_update_time(observed);

    let inserted = repo
        .commit_scan(&folder, &[file("a", 0, 10), file("b", 1, 20)])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let stored = repo.get_folder(&user(), &folder_id()).await.unwrap().unwrap();
    assert_eq!(stored.update_time(), Some(observed));

    let a = repo
        .get_file(&user(), &folder_id(), &FileUri::new("a").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.state(), FileState::Idle);
    assert_eq!(a.size(), 10);
    assert_eq!(a.hash(), Some(&hash('a')));
    assert_eq!(a.name(), "a.jpg");
}

#[tokio::test]
async fn test_commit_scan_ignores_known_uris() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10)], FileState::Ready).await;

    let inserted = repo.commit_scan(&folder, &[file("a", 5, 99)]).await.unwrap();
    assert_eq!(inserted, 0);

    let a = repo
        .get_file(&user(), &folder_id(), &FileUri::new("a").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.state(), FileState::Ready);
    assert_eq!(a.upload_priority(), 0);
}

#[tokio::test]
async fn test_commit_scan_requires_folder() {
    let repo = setup().await;
    let orphan = BackupFolder::new(user(), folder_id(), BucketId::new(7));

    let result = repo.commit_scan(&orphan, &[file("a", 0, 10)]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_max_upload_priority() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    assert_eq!(repo.max_upload_priority(&user()).await.unwrap(), None);

    repo.commit_scan(&folder, &[file("a", 3, 10), file("b", 9, 10)])
        .await
        .unwrap();
    assert_eq!(repo.max_upload_priority(&user()).await.unwrap(), Some(9));
}

#[tokio::test]
async fn test_files_in_state_ordered_by_priority() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(
        &repo,
        &folder,
        &[file("c", 2, 10), file("a", 0, 10), file("b", 1, 10)],
        FileState::Ready,
    )
    .await;

    let ready = repo
        .get_files_in_state(&user(), &folder_id(), FileState::Ready, 10)
        .await
        .unwrap();
    let order: Vec<&str> = ready.iter().map(|f| f.uri().as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);

    let limited = repo
        .get_files_in_state(&user(), &folder_id(), FileState::Ready, 2)
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

// ============================================================================
// Transition tests
// ============================================================================

#[tokio::test]
async fn test_transition_is_gated_on_current_state() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10), file("b", 1, 10)], FileState::Ready).await;

    let batch = uris(&["a", "b"]);
    let first = repo
        .transition_files(&user(), &folder_id(), &batch, FileState::Ready, FileState::Enqueued)
        .await
        .unwrap();
    let second = repo
        .transition_files(&user(), &folder_id(), &batch, FileState::Ready, FileState::Enqueued)
        .await
        .unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 0);
}

#[tokio::test]
async fn test_transition_rejects_illegal_edge() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10)], FileState::Idle).await;

    let result = repo
        .transition_files(&user(), &folder_id(), &uris(&["a"]), FileState::Idle, FileState::Complete)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_failure_counts_attempts_and_idle_resets_them() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10)], FileState::Failed).await;
    let a = FileUri::new("a").unwrap();

    let failed = repo.get_file(&user(), &folder_id(), &a).await.unwrap().unwrap();
    assert_eq!(failed.attempts(), 1);

    repo.transition_files(&user(), &folder_id(), &[a.clone()], FileState::Failed, FileState::Idle)
        .await
        .unwrap();
    let idle = repo.get_file(&user(), &folder_id(), &a).await.unwrap().unwrap();
    assert_eq!(idle.attempts(), 0);
}

#[tokio::test]
async fn test_mark_failed_as_ready_respects_attempt_budget() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10), file("b", 1, 10)], FileState::Failed).await;

    // push "b" to a second failure
    let b = uris(&["b"]);
    repo.transition_files(&user(), &folder_id(), &b, FileState::Failed, FileState::Ready)
        .await
        .unwrap();
    repo.transition_files(&user(), &folder_id(), &b, FileState::Ready, FileState::Enqueued)
        .await
        .unwrap();
    repo.transition_files(&user(), &folder_id(), &b, FileState::Enqueued, FileState::Failed)
        .await
        .unwrap();

    let moved = repo
        .mark_failed_as_ready(&user(), &folder_id(), BucketId::new(7), 2)
        .await
        .unwrap();
    assert_eq!(moved, 1);

    let counts = repo.count_files_by_state(&user(), &folder_id()).await.unwrap();
    assert_eq!(counts.get(&FileState::Ready), Some(&1));
    assert_eq!(counts.get(&FileState::Failed), Some(&1));

    let other_bucket = repo
        .mark_failed_as_ready(&user(), &folder_id(), BucketId::new(99), 10)
        .await
        .unwrap();
    assert_eq!(other_bucket, 0);
}

#[tokio::test]
async fn test_reset_failed_files_clears_attempts() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10)], FileState::Failed).await;

    let reset = repo.reset_failed_files(&user(), &folder_id()).await.unwrap();
    assert_eq!(reset, 1);

    let a = repo
        .get_file(&user(), &folder_id(), &FileUri::new("a").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.state(), FileState::Ready);
    assert_eq!(a.attempts(), 0);
}

#[tokio::test]
async fn test_revert_enqueued_and_reset_to_idle() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10)], FileState::Enqueued).await;
    seed(&repo, &folder, &[file("b", 1, 10)], FileState::Complete).await;

    assert_eq!(repo.revert_enqueued(&user(), &folder_id()).await.unwrap(), 1);

    let reset = repo.reset_to_idle(&user(), &folder_id()).await.unwrap();
    assert_eq!(reset, 1);

    let counts = repo.count_files_by_state(&user(), &folder_id()).await.unwrap();
    assert_eq!(counts.get(&FileState::Idle), Some(&1));
    assert_eq!(counts.get(&FileState::Complete), Some(&1));
}

#[tokio::test]
async fn test_reconcile_stale_enqueued() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10)], FileState::Enqueued).await;

    let none = repo
        .reconcile_stale_enqueued(&user(), Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(none, 0);

    let reconciled = repo
        .reconcile_stale_enqueued(&user(), Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(reconciled, 1);

    let a = repo
        .get_file(&user(), &folder_id(), &FileUri::new("a").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.state(), FileState::Failed);
    assert_eq!(a.attempts(), 1);
}

#[tokio::test]
async fn test_delete_files() {
    let repo = setup().await;
    let folder = create_folder(&repo).await;
    seed(&repo, &folder, &[file("a", 0, 10), file("b", 1, 10)], FileState::Complete).await;

    assert_eq!(
        repo.delete_files(&user(), &folder_id(), &uris(&["a", "zzz"]))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        repo.delete_files_in_state(&user(), &folder_id(), FileState::Complete)
            .await
            .unwrap(),
        1
    );
    assert!(repo.list_file_uris(&user(), &folder_id()).await.unwrap().is_empty());
}

// ============================================================================
// Duplicate tests
// ============================================================================

#[tokio::test]
async fn test_duplicates_saved_once_and_deleted_by_id() {
    let repo = setup().await;
    create_folder(&repo).await;
    let duplicate = BackupDuplicate::new(
        folder_id(),
        LinkId::new("link-1").unwrap(),
        hash('a'),
        Some(content('c')),
        LinkState::Active,
    );

    repo.save_duplicates(&user(), &[duplicate.clone()]).await.unwrap();
    repo.save_duplicates(&user(), &[duplicate]).await.unwrap();

    let stored = repo
        .get_duplicates_by_hash(&user(), &folder_id(), &hash('a'))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].id.is_some());
    assert!(stored[0].matches_content(&content('c')));

    let ids: Vec<i64> = stored.iter().filter_map(|d| d.id).collect();
    repo.delete_duplicates(&ids).await.unwrap();
    assert!(repo
        .get_duplicates_by_hash(&user(), &folder_id(), &hash('a'))
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Error and dismissal tests
// ============================================================================

#[tokio::test]
async fn test_errors_one_row_per_type() {
    let repo = setup().await;
    create_folder(&repo).await;

    repo.save_error(
        &user(),
        &BackupError::new(folder_id(), BackupErrorType::DriveStorage).with_message("first"),
    )
    .await
    .unwrap();
    repo.save_error(
        &user(),
        &BackupError::new(folder_id(), BackupErrorType::DriveStorage).with_message("second"),
    )
    .await
    .unwrap();
    repo.save_error(&user(), &BackupError::new(folder_id(), BackupErrorType::Migration))
        .await
        .unwrap();

    let errors = repo.get_errors(&user(), &folder_id()).await.unwrap();
    assert_eq!(errors.len(), 2);
    let storage = errors
        .iter()
        .find(|e| e.error_type == BackupErrorType::DriveStorage)
        .unwrap();
    assert_eq!(storage.message.as_deref(), Some("second"));
    assert_eq!(repo.list_errors(&user()).await.unwrap().len(), 2);

    let deleted = repo
        .delete_errors(&user(), &folder_id(), &[BackupErrorType::DriveStorage])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    let errors = repo.get_errors(&user(), &folder_id()).await.unwrap();
    assert_eq!(errors[0].error_type, BackupErrorType::Migration);
}

#[tokio::test]
async fn test_dismissals() {
    let repo = setup().await;
    let kind = BackupErrorType::BackgroundRestrictions;
    assert!(!repo.is_dismissed(&user(), kind).await.unwrap());

    repo.save_dismissal(&user(), kind).await.unwrap();
    repo.save_dismissal(&user(), kind).await.unwrap();
    assert!(repo.is_dismissed(&user(), kind).await.unwrap());

    repo.delete_dismissal(&user(), kind).await.unwrap();
    assert!(!repo.is_dismissed(&user(), kind).await.unwrap());
}
