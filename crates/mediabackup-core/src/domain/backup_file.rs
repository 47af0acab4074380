//! BackupFile domain entity
//!
//! This module defines the BackupFile entity, one row per local file
//! considered for backup, and the lifecycle state machine it moves through.
//!
//! ## State Machine
//!
//! ```text
//!                     remote says no candidate / draft
//!     ┌──────┐ ───────────────────────────────────────────► ┌───────┐
//!     │ Idle │                                               │ Ready │ ◄──┐
//!     └──────┘ ──► PossibleDuplicate ── no content match ──► └───────┘    │
//!                        │                                      │        │ retry
//!                        │ content match                        │ space  │ (attempts < max)
//!                        ▼                                      ▼        │
//!                   Duplicated (row removed)               ┌──────────┐  │
//!                                                          │ Enqueued │  │
//!                                                          └──────────┘  │
//!                                               success │        │ failure
//!                                                       ▼        ▼       │
//!                                                  Complete    Failed ───┘
//! ```
//!
//! Any non-terminal state may be reset to `Idle` when the folder's network
//! constraint changes, and `Enqueued` reverts to `Ready` when a folder is
//! stopped before the upload was confirmed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{BucketId, FileUri, FolderId, NameHash};

// ============================================================================
// FileState enum
// ============================================================================

/// Backup lifecycle state of a single file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Discovered by a scan, duplicate lookup not yet done
    #[default]
    Idle,
    /// Remote holds a file with the same name hash; content check pending
    PossibleDuplicate,
    /// Eligible for upload
    Ready,
    /// Handed to the upload subsystem, outcome not yet known
    Enqueued,
    /// Upload confirmed
    Complete,
    /// Upload failed; retried while attempts remain
    Failed,
    /// Content identical to an existing remote file
    Duplicated,
}

impl FileState {
    /// Every state, in lifecycle order
    pub const ALL: [FileState; 7] = [
        FileState::Idle,
        FileState::PossibleDuplicate,
        FileState::Ready,
        FileState::Enqueued,
        FileState::Complete,
        FileState::Failed,
        FileState::Duplicated,
    ];

    /// Returns true while the duplicate resolution phase still owns the file
    pub fn is_preparing(&self) -> bool {
        matches!(self, FileState::Idle | FileState::PossibleDuplicate)
    }

    /// Returns true if the file is waiting for or undergoing upload
    pub fn is_pending(&self) -> bool {
        matches!(self, FileState::Ready | FileState::Enqueued)
    }

    /// Returns true for states that end the file's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileState::Complete | FileState::Duplicated)
    }

    /// Checks whether the store may move a file from `from` to `to`
    pub fn allows(from: FileState, to: FileState) -> bool {
        use FileState::*;

        match (from, to) {
            (Idle, PossibleDuplicate) | (Idle, Ready) => true,
            (PossibleDuplicate, Ready) | (PossibleDuplicate, Duplicated) => true,
            (Ready, Enqueued) => true,
            (Enqueued, Complete) | (Enqueued, Failed) => true,
            // stop before the upload was confirmed
            (Enqueued, Ready) => true,
            (Failed, Ready) => true,
            // network constraint changed: redo dedup under the new constraint
            (from, Idle) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }

    /// Returns the state name (for diagnostics)
    pub fn name(&self) -> &'static str {
        match self {
            FileState::Idle => "Idle",
            FileState::PossibleDuplicate => "PossibleDuplicate",
            FileState::Ready => "Ready",
            FileState::Enqueued => "Enqueued",
            FileState::Complete => "Complete",
            FileState::Failed => "Failed",
            FileState::Duplicated => "Duplicated",
        }
    }

    /// Returns the storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Idle => "idle",
            FileState::PossibleDuplicate => "possible_duplicate",
            FileState::Ready => "ready",
            FileState::Enqueued => "enqueued",
            FileState::Complete => "complete",
            FileState::Failed => "failed",
            FileState::Duplicated => "duplicated",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "file state",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// BackupFile struct
// ============================================================================

/// One local file considered for backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Remote folder the file is uploaded into
    folder_id: FolderId,
    /// Local bucket the file was enumerated from
    bucket_id: BucketId,
    /// Local file handle
    uri: FileUri,
    /// Display name
    name: String,
    /// MIME type reported by the enumerator
    mime_type: String,
    /// Size in bytes
    size: u64,
    /// Capture time
    date: DateTime<Utc>,
    /// Last modification time, drives the scan watermark
    last_modified: DateTime<Utc>,
    /// Keyed hash of `name`
    hash: Option<NameHash>,
    /// Upload order, lower uploads earlier; never reassigned
    upload_priority: i64,
    /// Current lifecycle state
    state: FileState,
    /// Number of failed upload attempts
    attempts: u32,
}

impl BackupFile {
    /// Creates a freshly scanned file in `Idle`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        folder_id: FolderId,
        bucket_id: BucketId,
        uri: FileUri,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        date: DateTime<Utc>,
        last_modified: DateTime<Utc>,
        upload_priority: i64,
    ) -> Self {
        Self {
            folder_id,
            bucket_id,
            uri,
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            date,
            last_modified,
            hash: None,
            upload_priority,
            state: FileState::Idle,
            attempts: 0,
        }
    }

    /// Rebuilds a file from persisted fields
    ///
    /// Used by storage adapters; no transition checks apply.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        folder_id: FolderId,
        bucket_id: BucketId,
        uri: FileUri,
        name: String,
        mime_type: String,
        size: u64,
        date: DateTime<Utc>,
        last_modified: DateTime<Utc>,
        hash: Option<NameHash>,
        upload_priority: i64,
        state: FileState,
        attempts: u32,
    ) -> Self {
        Self {
            folder_id,
            bucket_id,
            uri,
            name,
            mime_type,
            size,
            date,
            last_modified,
            hash,
            upload_priority,
            state,
            attempts,
        }
    }

    /// Sets the name hash (builder style, used by the scanner)
    pub fn with_hash(mut self, hash: NameHash) -> Self {
        self.hash = Some(hash);
        self
    }

    // --- Getters ---

    pub fn folder_id(&self) -> &FolderId {
        &self.folder_id
    }

    pub fn bucket_id(&self) -> BucketId {
        self.bucket_id
    }

    pub fn uri(&self) -> &FileUri {
        &self.uri
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn hash(&self) -> Option<&NameHash> {
        self.hash.as_ref()
    }

    pub fn upload_priority(&self) -> i64 {
        self.upload_priority
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns true if the retry pass may move this file back to `Ready`
    pub fn is_retry_eligible(&self, max_attempts: u32) -> bool {
        self.state == FileState::Failed && self.attempts < max_attempts
    }
}

// ============================================================================
// State transition methods
// ============================================================================

impl BackupFile {
    /// Checks if a state transition is valid
    pub fn can_transition_to(&self, target: FileState) -> bool {
        FileState::allows(self.state, target)
    }

    /// Attempts to transition to a new state
    ///
    /// Entering `Failed` counts one attempt; leaving for `Idle` clears the
    /// attempt counter because the file starts its lifecycle over.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: FileState) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }

        match target {
            FileState::Failed => self.attempts = self.attempts.saturating_add(1),
            FileState::Idle => self.attempts = 0,
            _ => {}
        }

        self.state = target;
        Ok(())
    }

    /// Convenience method for the remote lookup phase
    pub fn mark_possible_duplicate(&mut self) -> Result<(), DomainError> {
        self.transition_to(FileState::PossibleDuplicate)
    }

    /// Convenience method for a file cleared for upload
    pub fn mark_ready(&mut self) -> Result<(), DomainError> {
        self.transition_to(FileState::Ready)
    }

    /// Convenience method for a confirmed content duplicate
    pub fn mark_duplicated(&mut self) -> Result<(), DomainError> {
        self.transition_to(FileState::Duplicated)
    }

    /// Convenience method for a file handed to the upload subsystem
    pub fn mark_enqueued(&mut self) -> Result<(), DomainError> {
        self.transition_to(FileState::Enqueued)
    }

    /// Convenience method for a confirmed upload
    pub fn mark_complete(&mut self) -> Result<(), DomainError> {
        self.transition_to(FileState::Complete)
    }

    /// Convenience method for a failed upload
    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        self.transition_to(FileState::Failed)
    }

    /// Moves a failed file back to `Ready` if it has attempts left
    pub fn retry(&mut self, max_attempts: u32) -> Result<(), DomainError> {
        if !self.is_retry_eligible(max_attempts) {
            return Err(DomainError::InvalidState {
                from: self.state.name().to_string(),
                to: FileState::Ready.name().to_string(),
            });
        }
        self.transition_to(FileState::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_test_file() -> BackupFile {
        let taken = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        BackupFile::new(
            FolderId::new("folder").unwrap(),
            BucketId::new(7),
            FileUri::new("content://media/1").unwrap(),
            "IMG_0001.jpg",
            "image/jpeg",
            2048,
            taken,
            taken,
            0,
        )
    }

    fn file_in_state(state: FileState) -> BackupFile {
        let mut file = create_test_file();
        let path: &[FileState] = match state {
            FileState::Idle => &[],
            FileState::PossibleDuplicate => &[FileState::PossibleDuplicate],
            FileState::Ready => &[FileState::Ready],
            FileState::Enqueued => &[FileState::Ready, FileState::Enqueued],
            FileState::Complete => &[FileState::Ready, FileState::Enqueued, FileState::Complete],
            FileState::Failed => &[FileState::Ready, FileState::Enqueued, FileState::Failed],
            FileState::Duplicated => &[FileState::PossibleDuplicate, FileState::Duplicated],
        };
        for step in path {
            file.transition_to(*step).unwrap();
        }
        file
    }

    mod file_state_tests {
        use super::*;

        #[test]
        fn test_storage_roundtrip() {
            for state in FileState::ALL {
                assert_eq!(state.as_str().parse::<FileState>().unwrap(), state);
            }
            assert!("uploading".parse::<FileState>().is_err());
        }

        #[test]
        fn test_classification() {
            assert!(FileState::Idle.is_preparing());
            assert!(FileState::PossibleDuplicate.is_preparing());
            assert!(FileState::Ready.is_pending());
            assert!(FileState::Enqueued.is_pending());
            assert!(!FileState::Failed.is_pending());
            assert!(FileState::Complete.is_terminal());
            assert!(FileState::Duplicated.is_terminal());
        }

        #[test]
        fn test_default_is_idle() {
            assert_eq!(FileState::default(), FileState::Idle);
        }
    }

    mod state_transition_tests {
        use super::*;

        #[test]
        fn test_can_transition_from_idle() {
            let file = file_in_state(FileState::Idle);
            assert!(file.can_transition_to(FileState::PossibleDuplicate));
            assert!(file.can_transition_to(FileState::Ready));
            assert!(!file.can_transition_to(FileState::Enqueued));
            assert!(!file.can_transition_to(FileState::Duplicated));
            assert!(!file.can_transition_to(FileState::Idle));
        }

        #[test]
        fn test_can_transition_from_possible_duplicate() {
            let file = file_in_state(FileState::PossibleDuplicate);
            assert!(file.can_transition_to(FileState::Ready));
            assert!(file.can_transition_to(FileState::Duplicated));
            assert!(!file.can_transition_to(FileState::Enqueued));
        }

        #[test]
        fn test_enqueue_only_from_ready() {
            for state in FileState::ALL {
                let allowed = FileState::allows(state, FileState::Enqueued);
                assert_eq!(allowed, state == FileState::Ready, "from {state}");
            }
        }

        #[test]
        fn test_terminal_states_are_final() {
            for terminal in [FileState::Complete, FileState::Duplicated] {
                for target in FileState::ALL {
                    assert!(!FileState::allows(terminal, target), "{terminal} -> {target}");
                }
            }
        }

        #[test]
        fn test_failure_counts_attempts() {
            let mut file = file_in_state(FileState::Failed);
            assert_eq!(file.attempts(), 1);

            file.retry(3).unwrap();
            file.mark_enqueued().unwrap();
            file.mark_failed().unwrap();
            assert_eq!(file.attempts(), 2);
        }

        #[test]
        fn test_retry_bounded_by_max_attempts() {
            let mut file = file_in_state(FileState::Failed);
            assert!(file.is_retry_eligible(2));
            assert!(!file.is_retry_eligible(1));

            let err = file.retry(1).unwrap_err();
            assert!(matches!(err, DomainError::InvalidState { .. }));
            assert_eq!(file.state(), FileState::Failed);
        }

        #[test]
        fn test_retry_requires_failed() {
            let mut file = file_in_state(FileState::Ready);
            assert!(file.retry(3).is_err());
        }

        #[test]
        fn test_reset_to_idle_clears_attempts() {
            let mut file = file_in_state(FileState::Failed);
            file.transition_to(FileState::Idle).unwrap();
            assert_eq!(file.state(), FileState::Idle);
            assert_eq!(file.attempts(), 0);
        }

        #[test]
        fn test_stop_reverts_enqueued() {
            let mut file = file_in_state(FileState::Enqueued);
            file.mark_ready().unwrap();
            assert_eq!(file.state(), FileState::Ready);
        }

        #[test]
        fn test_invalid_transition_keeps_state() {
            let mut file = file_in_state(FileState::Ready);
            let err = file.mark_complete().unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid state transition from Ready to Complete"
            );
            assert_eq!(file.state(), FileState::Ready);
        }
    }

    #[test]
    fn test_with_hash() {
        let hash = NameHash::new("ab".repeat(32)).unwrap();
        let file = create_test_file().with_hash(hash.clone());
        assert_eq!(file.hash(), Some(&hash));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let file = file_in_state(FileState::Enqueued);
        let json = serde_json::to_string(&file).unwrap();
        let back: BackupFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, file);
    }
}
