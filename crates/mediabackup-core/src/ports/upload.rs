//! Upload subsystem port (driven/secondary port)
//!
//! The upload subsystem performs the actual transfer. The core hands it
//! batches and never waits on individual transfers; outcomes come back
//! through the upload-outcome use case.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific.
//! - An `Ok` from [`IUploadSubsystem::upload`] means the batch was
//!   accepted, not that it was transferred.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    newtypes::{FileUri, FolderId, UserId},
    BackupFile,
};

/// Local caching applied by the upload subsystem to an uploaded file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOption {
    /// Nothing is kept locally
    #[default]
    None,
    /// Keep the default thumbnail cached
    ThumbnailDefault,
}

impl fmt::Display for CacheOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheOption::None => write!(f, "none"),
            CacheOption::ThumbnailDefault => write!(f, "thumbnail_default"),
        }
    }
}

/// What the upload subsystem needs to know about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileDescriptor {
    pub uri: FileUri,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub date: DateTime<Utc>,
}

impl From<&BackupFile> for UploadFileDescriptor {
    fn from(file: &BackupFile) -> Self {
        Self {
            uri: file.uri().clone(),
            name: file.name().to_string(),
            mime_type: file.mime_type().to_string(),
            size: file.size(),
            date: file.date(),
        }
    }
}

/// Port trait for the external upload subsystem
#[async_trait::async_trait]
pub trait IUploadSubsystem: Send + Sync {
    /// Submits one batch sharing a priority and cache option
    async fn upload(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        files: &[UploadFileDescriptor],
        cache_option: CacheOption,
        priority: i64,
        background: bool,
    ) -> anyhow::Result<()>;

    /// Cancels pending uploads of the given files
    async fn cancel(
        &self,
        user_id: &UserId,
        folder_id: &FolderId,
        uris: &[FileUri],
    ) -> anyhow::Result<()>;
}
