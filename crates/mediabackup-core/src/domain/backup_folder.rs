//! BackupFolder and BackupConfiguration entities
//!
//! A [`BackupFolder`] binds a local bucket to the remote folder it is
//! backed up into, together with the two watermarks the pipeline uses:
//! `update_time` bounds incremental scans and `sync_time` records the last
//! successful sync pass (read by the stale-folder sweep).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{BucketId, FolderId, UserId};

// ============================================================================
// BackupFolder
// ============================================================================

/// A sync root: one local bucket backed up into one remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFolder {
    user_id: UserId,
    folder_id: FolderId,
    bucket_id: BucketId,
    update_time: Option<DateTime<Utc>>,
    sync_time: Option<DateTime<Utc>>,
}

impl BackupFolder {
    /// Creates a folder that has never been scanned
    pub fn new(user_id: UserId, folder_id: FolderId, bucket_id: BucketId) -> Self {
        Self {
            user_id,
            folder_id,
            bucket_id,
            update_time: None,
            sync_time: None,
        }
    }

    /// Rebuilds a folder from persisted fields
    pub fn restore(
        user_id: UserId,
        folder_id: FolderId,
        bucket_id: BucketId,
        update_time: Option<DateTime<Utc>>,
        sync_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            folder_id,
            bucket_id,
            update_time,
            sync_time,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn folder_id(&self) -> &FolderId {
        &self.folder_id
    }

    pub fn bucket_id(&self) -> BucketId {
        self.bucket_id
    }

    /// Watermark of the last successful scan
    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        self.update_time
    }

    /// Watermark of the last successful sync pass
    pub fn sync_time(&self) -> Option<DateTime<Utc>> {
        self.sync_time
    }

    /// Advances the scan watermark; it never moves backwards
    pub fn advance_update_time(&mut self, observed: DateTime<Utc>) {
        if self.update_time.map_or(true, |current| observed > current) {
            self.update_time = Some(observed);
        }
    }

    /// Returns true if the folder has not synced within `window` of `now`
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.sync_time {
            Some(synced) => now - synced > window,
            None => true,
        }
    }
}

impl fmt::Display for BackupFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (bucket {})", self.folder_id, self.bucket_id)
    }
}

// ============================================================================
// Network constraint
// ============================================================================

/// Current connectivity as reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    /// No usable connection
    #[default]
    None,
    /// Connected on a metered network (cellular, hotspot)
    Connected,
    /// Connected on an unmetered network (Wi-Fi, ethernet)
    Unmetered,
}

impl NetworkState {
    pub fn is_connected(&self) -> bool {
        !matches!(self, NetworkState::None)
    }
}

/// Network a folder is allowed to upload on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// Any connection
    Connected,
    /// Unmetered connections only
    #[default]
    Unmetered,
}

impl NetworkType {
    /// Returns true if uploads may run on `state`
    pub fn is_satisfied_by(&self, state: NetworkState) -> bool {
        match self {
            NetworkType::Connected => state.is_connected(),
            NetworkType::Unmetered => state == NetworkState::Unmetered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Connected => "connected",
            NetworkType::Unmetered => "unmetered",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(NetworkType::Connected),
            "unmetered" => Ok(NetworkType::Unmetered),
            other => Err(DomainError::UnknownVariant {
                kind: "network type",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// BackupConfiguration
// ============================================================================

/// Per-folder user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfiguration {
    pub user_id: UserId,
    pub folder_id: FolderId,
    pub network_type: NetworkType,
}

impl BackupConfiguration {
    pub fn new(user_id: UserId, folder_id: FolderId, network_type: NetworkType) -> Self {
        Self {
            user_id,
            folder_id,
            network_type,
        }
    }

    /// Returns true if moving from `self` to `other` requires a fresh
    /// scan/dedup pass
    pub fn requires_reset(&self, other: &BackupConfiguration) -> bool {
        self.network_type != other.network_type
    }
}
