//! UI-facing backup events
//!
//! Events are announced fire-and-forget; the core never waits for a
//! consumer.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::backup_error::BackupErrorType;
use super::newtypes::FolderId;

/// Notification published through the event announcer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackupEvent {
    /// A folder's pipeline started a pass
    BackupFolder { folder_id: FolderId },
    /// Every file of the folder is backed up and cleaned up
    BackupCompleted { folder_id: FolderId },
    /// The folder's pipeline was halted by an error
    BackupStopped {
        folder_id: FolderId,
        error: BackupErrorType,
    },
}

impl BackupEvent {
    pub fn folder_id(&self) -> &FolderId {
        match self {
            BackupEvent::BackupFolder { folder_id }
            | BackupEvent::BackupCompleted { folder_id }
            | BackupEvent::BackupStopped { folder_id, .. } => folder_id,
        }
    }
}

impl fmt::Display for BackupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupEvent::BackupFolder { folder_id } => write!(f, "backup started: {folder_id}"),
            BackupEvent::BackupCompleted { folder_id } => {
                write!(f, "backup completed: {folder_id}")
            }
            BackupEvent::BackupStopped { folder_id, error } => {
                write!(f, "backup stopped: {folder_id} ({error})")
            }
        }
    }
}
