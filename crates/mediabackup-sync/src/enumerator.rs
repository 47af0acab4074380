//! Directory-backed local enumerator (secondary/driven adapter)
//!
//! Implements [`ILocalEnumerator`] over plain directories using `tokio::fs`.
//! Each configured bucket maps to a directory that is listed recursively;
//! a file's URI is its absolute path.
//!
//! ## Design Decisions
//!
//! - **Capture date**: directories carry no capture metadata, so `date`
//!   equals the modification time.
//! - **Symlinks**: not followed, so a bucket cannot list files outside
//!   its directory.
//! - **Streaming**: content is read in fixed-size chunks; a file is never
//!   loaded whole.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use mediabackup_core::config::Config;
use mediabackup_core::domain::newtypes::{BucketId, FileUri};
use mediabackup_core::ports::{IContentStream, ILocalEnumerator, LocalFileDescriptor};

/// Default read size of content streams (256 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Adapter mapping buckets to local directories
#[derive(Debug, Clone)]
pub struct DirectoryEnumerator {
    buckets: HashMap<BucketId, PathBuf>,
    default_bucket: Option<BucketId>,
    chunk_size: usize,
}

impl DirectoryEnumerator {
    pub fn new(
        buckets: impl IntoIterator<Item = (BucketId, PathBuf)>,
        default_bucket: Option<BucketId>,
    ) -> Self {
        Self {
            buckets: buckets.into_iter().collect(),
            default_bucket,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Builds the enumerator from the `buckets` section of the config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .buckets
                .iter()
                .map(|b| (BucketId::new(b.id), b.path.clone())),
            config.default_bucket_id(),
        )
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn bucket_path(&self, bucket_id: BucketId) -> Option<&Path> {
        self.buckets.get(&bucket_id).map(PathBuf::as_path)
    }

    fn is_inside_bucket(&self, path: &Path) -> bool {
        self.buckets.values().any(|root| path.starts_with(root))
    }
}

/// MIME type guessed from the file extension
fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

/// Chunked reader over a local file
struct FileContentStream {
    file: tokio::fs::File,
    chunk_size: usize,
}

#[async_trait::async_trait]
impl IContentStream for FileContentStream {
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        let mut buffer = vec![0u8; self.chunk_size];
        let read = self.file.read(&mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }
        buffer.truncate(read);
        Ok(Some(buffer))
    }
}

#[async_trait::async_trait]
impl ILocalEnumerator for DirectoryEnumerator {
    async fn list(
        &self,
        bucket_id: BucketId,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<LocalFileDescriptor>> {
        let root = self
            .buckets
            .get(&bucket_id)
            .ok_or_else(|| anyhow!("Unknown bucket {bucket_id}"))?;

        let mut pending = vec![root.clone()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // removed while we were listing
                Err(e) if e.kind() == ErrorKind::NotFound && dir != *root => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to list {}", dir.display()))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };
                let last_modified = DateTime::<Utc>::from(metadata.modified()?);
                if since.is_some_and(|watermark| last_modified <= watermark) {
                    continue;
                }

                let Some(uri) = path.to_str().and_then(|p| FileUri::new(p).ok()) else {
                    warn!(path = %path.display(), "Skipping file with an unrepresentable path");
                    continue;
                };

                files.push(LocalFileDescriptor {
                    uri,
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: metadata.len(),
                    mime_type: guess_mime_type(&path),
                    date: last_modified,
                    last_modified,
                });
            }
        }

        debug!(bucket_id = %bucket_id, count = files.len(), "Bucket listed");
        Ok(files)
    }

    async fn open(&self, uri: &FileUri) -> anyhow::Result<Option<Box<dyn IContentStream>>> {
        let path = Path::new(uri.as_str());
        if !self.is_inside_bucket(path) {
            return Err(anyhow!("{uri} is outside every configured bucket"));
        }

        match tokio::fs::File::open(path).await {
            Ok(file) => {
                let stream: Box<dyn IContentStream> = Box::new(FileContentStream {
                    file,
                    chunk_size: self.chunk_size,
                });
                Ok(Some(stream))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to open {uri}")),
        }
    }

    async fn default_bucket(&self) -> anyhow::Result<Option<BucketId>> {
        Ok(self.default_bucket)
    }
}
