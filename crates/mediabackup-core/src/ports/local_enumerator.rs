//! Local enumerator port (driven/secondary port)
//!
//! This module defines the interface to the device's media index: listing
//! the files of a source bucket modified after a watermark, and streaming
//! a file's bytes for content hashing.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because enumeration is platform-specific.
//! - Content is streamed in chunks so hashing never holds a whole file.
//! - A file that disappeared since it was listed is reported as `None`,
//!   not as an error: vanished files are a normal outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{BucketId, FileUri};

/// A local file as reported by the enumerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileDescriptor {
    pub uri: FileUri,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Capture time; equals `last_modified` when the platform has none
    pub date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Chunked reader over a file's bytes
#[async_trait::async_trait]
pub trait IContentStream: Send {
    /// Next chunk of content, `None` at end of file
    async fn next_chunk(&mut self) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Port trait for the device media index
#[async_trait::async_trait]
pub trait ILocalEnumerator: Send + Sync {
    /// Lists files of `bucket_id` modified strictly after `since`
    ///
    /// `None` lists every file of the bucket.
    async fn list(
        &self,
        bucket_id: BucketId,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<LocalFileDescriptor>>;

    /// Opens a file for reading, `None` if it no longer exists
    async fn open(&self, uri: &FileUri) -> anyhow::Result<Option<Box<dyn IContentStream>>>;

    /// The device's default bucket, if it has one
    async fn default_bucket(&self) -> anyhow::Result<Option<BucketId>>;
}
