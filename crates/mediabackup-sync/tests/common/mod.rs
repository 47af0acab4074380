//! In-memory fakes for the external collaborators of the pipeline
//!
//! The state store is the real SQLite repository on an in-memory database.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use mediabackup_cache::{DatabasePool, SqliteBackupRepository};
use mediabackup_core::config::BackupConfig;
use mediabackup_core::domain::{
    newtypes::{BucketId, ClientUid, ContentHash, FileUri, FolderId, LinkId, NameHash, UserId},
    BackupDuplicate, BackupEvent, EnvironmentSnapshot, LinkState, NetworkState,
};
use mediabackup_core::hashing::{self, ContentHasher};
use mediabackup_core::ports::{
    CacheOption, IContentStream, IDeviceInfo, IDuplicateService, IEventAnnouncer,
    IHashKeyProvider, ILocalEnumerator, IUploadSubsystem, LocalFileDescriptor,
    UploadFileDescriptor,
};
use mediabackup_sync::{BackupOrchestrator, BackupPorts, SignalHub};

pub const MB: u64 = 1024 * 1024;
pub const NAME_KEY: &[u8] = b"name-key";
pub const NODE_KEY: &[u8] = b"node-key";

pub fn user() -> UserId {
    UserId::new("user-1").unwrap()
}

pub fn folder_id() -> FolderId {
    FolderId::new("photos").unwrap()
}

pub fn bucket() -> BucketId {
    BucketId::new(1)
}

/// A second folder, backed by its own bucket
pub fn videos_id() -> FolderId {
    FolderId::new("videos").unwrap()
}

pub fn videos_bucket() -> BucketId {
    BucketId::new(2)
}

pub fn uri(value: &str) -> FileUri {
    FileUri::new(value).unwrap()
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn name_hash(name: &str) -> NameHash {
    hashing::name_hash(NAME_KEY, name).unwrap()
}

pub fn content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = ContentHasher::new(Default::default(), NODE_KEY).unwrap();
    hasher.update(content);
    hasher.finalize().unwrap()
}

// ============================================================================
// Local enumerator
// ============================================================================

#[derive(Default)]
pub struct FakeEnumerator {
    files: Mutex<Vec<(BucketId, LocalFileDescriptor)>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    default_bucket: Option<BucketId>,
}

impl FakeEnumerator {
    /// Adds a file named `<uri>.jpg`, captured `minute` minutes after the base time
    pub fn add(&self, uri: &str, size: u64, minute: i64, content: &[u8]) {
        self.add_to(bucket(), uri, size, minute, content);
    }

    pub fn add_to(&self, bucket_id: BucketId, uri: &str, size: u64, minute: i64, content: &[u8]) {
        let at = base_time() + Duration::minutes(minute);
        self.files.lock().unwrap().push((
            bucket_id,
            LocalFileDescriptor {
                uri: FileUri::new(uri).unwrap(),
                name: format!("{uri}.jpg"),
                size,
                mime_type: "image/jpeg".to_string(),
                date: at,
                last_modified: at,
            },
        ));
        self.contents
            .lock()
            .unwrap()
            .insert(uri.to_string(), content.to_vec());
    }

    /// Removes the file's bytes while keeping it listed
    pub fn vanish(&self, uri: &str) {
        self.contents.lock().unwrap().remove(uri);
    }
}

struct MemoryStream {
    chunks: Vec<Vec<u8>>,
}

#[async_trait::async_trait]
impl IContentStream for MemoryStream {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        if self.chunks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.chunks.remove(0)))
        }
    }
}

#[async_trait::async_trait]
impl ILocalEnumerator for FakeEnumerator {
    async fn list(
        &self,
        bucket_id: BucketId,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<LocalFileDescriptor>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(b, f)| *b == bucket_id && since.map_or(true, |s| f.last_modified > s))
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn open(&self, uri: &FileUri) -> anyhow::Result<Option<Box<dyn IContentStream>>> {
        let content = self.contents.lock().unwrap().get(uri.as_str()).cloned();
        Ok(content.map(|bytes| {
            let stream: Box<dyn IContentStream> = Box::new(MemoryStream {
                chunks: bytes.chunks(3).map(<[u8]>::to_vec).collect(),
            });
            stream
        }))
    }

    async fn default_bucket(&self) -> anyhow::Result<Option<BucketId>> {
        Ok(self.default_bucket)
    }
}

// ============================================================================
// Remote duplicate service
// ============================================================================

#[derive(Default)]
pub struct FakeDuplicateService {
    remote: Mutex<Vec<BackupDuplicate>>,
    pub lookups: AtomicU64,
    /// Lookups left to fail before the service answers again
    pub failures: AtomicU64,
    pub deleted_drafts: Mutex<Vec<LinkId>>,
}

impl FakeDuplicateService {
    pub fn add_remote(&self, link: &str, name: &str, content: Option<&[u8]>, state: LinkState) {
        self.remote.lock().unwrap().push(BackupDuplicate::new(
            folder_id(),
            LinkId::new(link).unwrap(),
            name_hash(name),
            content.map(content_hash),
            state,
        ));
    }
}

#[async_trait::async_trait]
impl IDuplicateService for FakeDuplicateService {
    async fn find_duplicates(
        &self,
        _folder_id: &FolderId,
        name_hashes: &[NameHash],
        _client_uids: &[ClientUid],
    ) -> anyhow::Result<Vec<BackupDuplicate>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("duplicate service unavailable");
        }
        Ok(self
            .remote
            .lock()
            .unwrap()
            .iter()
            .filter(|d| name_hashes.contains(&d.hash))
            .cloned()
            .collect())
    }

    async fn delete_drafts(&self, _folder_id: &FolderId, link_ids: &[LinkId]) -> anyhow::Result<()> {
        self.deleted_drafts
            .lock()
            .unwrap()
            .extend(link_ids.iter().cloned());
        Ok(())
    }
}

// ============================================================================
// Upload subsystem
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub folder_id: FolderId,
    pub uris: Vec<FileUri>,
    pub cache_option: CacheOption,
    pub priority: i64,
}

#[derive(Default)]
pub struct FakeUpload {
    pub calls: Mutex<Vec<UploadCall>>,
    pub cancelled: Mutex<Vec<FileUri>>,
}

impl FakeUpload {
    pub fn uploaded_folders(&self) -> Vec<FolderId> {
        let mut folders: Vec<FolderId> = Vec::new();
        for call in self.calls.lock().unwrap().iter() {
            if folders.last() != Some(&call.folder_id) {
                folders.push(call.folder_id.clone());
            }
        }
        folders
    }

    pub fn uploaded_uris(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .flat_map(|c| c.uris.iter().map(|u| u.as_str().to_string()))
            .collect()
    }
}

#[async_trait::async_trait]
impl IUploadSubsystem for FakeUpload {
    async fn upload(
        &self,
        _user_id: &UserId,
        folder_id: &FolderId,
        files: &[UploadFileDescriptor],
        cache_option: CacheOption,
        priority: i64,
        _background: bool,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(UploadCall {
            folder_id: folder_id.clone(),
            uris: files.iter().map(|f| f.uri.clone()).collect(),
            cache_option,
            priority,
        });
        Ok(())
    }

    async fn cancel(
        &self,
        _user_id: &UserId,
        _folder_id: &FolderId,
        uris: &[FileUri],
    ) -> anyhow::Result<()> {
        self.cancelled.lock().unwrap().extend(uris.iter().cloned());
        Ok(())
    }
}

// ============================================================================
// Device, keys, announcer
// ============================================================================

pub struct FakeDevice {
    pub available: AtomicU64,
}

#[async_trait::async_trait]
impl IDeviceInfo for FakeDevice {
    async fn available_bytes(&self) -> anyhow::Result<u64> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    fn client_uid(&self) -> ClientUid {
        ClientUid::new("device-1").unwrap()
    }
}

pub struct FixedKeys;

#[async_trait::async_trait]
impl IHashKeyProvider for FixedKeys {
    async fn name_key(&self, _user_id: &UserId, _folder_id: &FolderId) -> anyhow::Result<Vec<u8>> {
        Ok(NAME_KEY.to_vec())
    }

    async fn node_key(&self, _user_id: &UserId, _folder_id: &FolderId) -> anyhow::Result<Vec<u8>> {
        Ok(NODE_KEY.to_vec())
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    pub events: Mutex<Vec<BackupEvent>>,
}

impl IEventAnnouncer for RecordingAnnouncer {
    fn announce(&self, _user_id: &UserId, event: BackupEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub repo: Arc<SqliteBackupRepository>,
    pub enumerator: Arc<FakeEnumerator>,
    pub remote: Arc<FakeDuplicateService>,
    pub upload: Arc<FakeUpload>,
    pub device: Arc<FakeDevice>,
    pub announcer: Arc<RecordingAnnouncer>,
    pub hub: Arc<SignalHub>,
    pub ports: BackupPorts,
}

impl Harness {
    pub async fn new(available: u64) -> Self {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let repo = Arc::new(SqliteBackupRepository::new(pool.pool().clone()));
        let enumerator = Arc::new(FakeEnumerator::default());
        let remote = Arc::new(FakeDuplicateService::default());
        let upload = Arc::new(FakeUpload::default());
        let device = Arc::new(FakeDevice {
            available: AtomicU64::new(available),
        });
        let announcer = Arc::new(RecordingAnnouncer::default());
        let hub = Arc::new(SignalHub::new(EnvironmentSnapshot {
            network: NetworkState::Unmetered,
            ..EnvironmentSnapshot::default()
        }));

        let ports = BackupPorts {
            repository: repo.clone(),
            enumerator: enumerator.clone(),
            duplicate_service: remote.clone(),
            upload: upload.clone(),
            device: device.clone(),
            keys: Arc::new(FixedKeys),
            signals: hub.clone(),
            announcer: announcer.clone(),
        };

        Self {
            repo,
            enumerator,
            remote,
            upload,
            device,
            announcer,
            hub,
            ports,
        }
    }

    pub fn orchestrator(&self, config: BackupConfig) -> BackupOrchestrator {
        BackupOrchestrator::new(user(), self.ports.clone(), config, CancellationToken::new())
    }
}

/// Defaults with no reserved space, so tests reason in exact bytes
pub fn test_config() -> BackupConfig {
    BackupConfig {
        reserved_left_space_mb: 0,
        ..BackupConfig::default()
    }
}
