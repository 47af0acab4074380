//! Derived backup status and the status reducer
//!
//! [`BackupStatus`] is never stored. It is recomputed from a
//! [`StatusSnapshot`] (file counts, persisted errors and the current
//! environment signals) by [`reduce_status`], a pure function, so the
//! signal subscription side can be tested separately from the reduction.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::backup_error::BackupErrorType;
use super::backup_file::FileState;
use super::backup_folder::{NetworkState, NetworkType};
use super::newtypes::{BucketId, FolderId};

// ============================================================================
// Counts
// ============================================================================

/// Per-folder file counts the status is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCounts {
    /// Every tracked file, including completed ones awaiting cleanup
    pub total: u64,
    /// Ready or enqueued
    pub pending: u64,
    /// Idle or awaiting the content check
    pub preparing: u64,
    /// Failed uploads (retryable or not)
    pub failed: u64,
    /// Uploaded, not yet cleaned up
    pub complete: u64,
}

impl BackupCounts {
    /// Builds counts from a per-state histogram
    pub fn from_state_counts(counts: &HashMap<FileState, u64>) -> Self {
        let mut out = Self::default();
        for (state, &n) in counts {
            match state {
                FileState::Idle | FileState::PossibleDuplicate => out.preparing += n,
                FileState::Ready | FileState::Enqueued => out.pending += n,
                FileState::Failed => out.failed += n,
                FileState::Complete => out.complete += n,
                // removed on transition, never counted
                FileState::Duplicated => continue,
            }
            out.total += n;
        }
        out
    }

    /// The backup-complete predicate used by cleanup
    pub fn is_backup_complete(&self) -> bool {
        self.pending == 0 && self.preparing == 0 && self.failed == 0
    }
}

// ============================================================================
// BackupStatus
// ============================================================================

/// Aggregated, user-facing state of a folder's backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupStatus {
    /// Scanning or resolving duplicates
    Preparing { counts: BackupCounts },
    /// Uploads pending or running
    InProgress { counts: BackupCounts },
    /// Nothing pending, but some files failed
    Uncompleted { counts: BackupCounts },
    /// Everything backed up
    Complete { counts: BackupCounts },
    /// Blocked by at least one error
    Failed {
        errors: Vec<BackupErrorType>,
        counts: BackupCounts,
    },
}

impl BackupStatus {
    pub fn counts(&self) -> &BackupCounts {
        match self {
            BackupStatus::Preparing { counts }
            | BackupStatus::InProgress { counts }
            | BackupStatus::Uncompleted { counts }
            | BackupStatus::Complete { counts }
            | BackupStatus::Failed { counts, .. } => counts,
        }
    }

    pub fn errors(&self) -> &[BackupErrorType] {
        match self {
            BackupStatus::Failed { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackupStatus::Preparing { .. } => "Preparing",
            BackupStatus::InProgress { .. } => "InProgress",
            BackupStatus::Uncompleted { .. } => "Uncompleted",
            BackupStatus::Complete { .. } => "Complete",
            BackupStatus::Failed { .. } => "Failed",
        }
    }
}

// ============================================================================
// Environment signals
// ============================================================================

/// Media permission as reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Granted,
    Denied,
}

/// Point-in-time view of every environment signal the status depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub permission: PermissionState,
    pub network: NetworkState,
    /// The OS is throttling background work for this app
    pub background_restricted: bool,
    /// Uploads allowed by feature flag / server
    pub uploads_allowed: bool,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            permission: PermissionState::Granted,
            network: NetworkState::None,
            background_restricted: false,
            uploads_allowed: true,
        }
    }
}

/// Errors implied by the environment for a folder with `network_type`
///
/// A background restriction the user dismissed is not reported.
pub fn environment_errors(
    environment: &EnvironmentSnapshot,
    network_type: NetworkType,
    background_dismissed: bool,
) -> Vec<BackupErrorType> {
    let mut errors = Vec::new();

    if environment.permission == PermissionState::Denied {
        errors.push(BackupErrorType::Permissions);
    }

    if !network_type.is_satisfied_by(environment.network) {
        if environment.network.is_connected() {
            errors.push(BackupErrorType::WifiConnectivity);
        } else {
            errors.push(BackupErrorType::Connectivity);
        }
    }

    if environment.background_restricted && !background_dismissed {
        errors.push(BackupErrorType::BackgroundRestrictions);
    }

    if !environment.uploads_allowed {
        errors.push(BackupErrorType::UploadNotAllowed);
    }

    errors
}

// ============================================================================
// Reducer
// ============================================================================

/// Everything [`reduce_status`] needs, captured at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub counts: BackupCounts,
    pub network_type: NetworkType,
    pub environment: EnvironmentSnapshot,
    /// The user dismissed the background-restriction message
    pub background_dismissed: bool,
    /// Errors persisted for the folder
    pub persisted_errors: Vec<BackupErrorType>,
}

/// Reduces a snapshot to the folder's [`BackupStatus`]
///
/// Environment and persisted errors are merged and de-duplicated by type.
/// Any error yields `Failed`, carrying the live counts unchanged.
pub fn reduce_status(snapshot: &StatusSnapshot) -> BackupStatus {
    let errors: BTreeSet<BackupErrorType> = environment_errors(
        &snapshot.environment,
        snapshot.network_type,
        snapshot.background_dismissed,
    )
    .into_iter()
    .chain(snapshot.persisted_errors.iter().copied())
    .collect();

    let counts = snapshot.counts;

    if !errors.is_empty() {
        return BackupStatus::Failed {
            errors: errors.into_iter().collect(),
            counts,
        };
    }

    if counts.preparing > 0 {
        BackupStatus::Preparing { counts }
    } else if counts.pending > 0 {
        BackupStatus::InProgress { counts }
    } else if counts.failed > 0 {
        BackupStatus::Uncompleted { counts }
    } else {
        BackupStatus::Complete { counts }
    }
}

// ============================================================================
// BackupState
// ============================================================================

/// Result of the error/health aggregation for one folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backup", rename_all = "snake_case")]
pub enum BackupState {
    /// Backup is not enabled for the folder
    Disabled {
        /// The device has a default bucket backup could be enabled for
        has_default_bucket: bool,
    },
    Enabled {
        folder_id: FolderId,
        bucket_id: BucketId,
        network_type: NetworkType,
        status: BackupStatus,
    },
}

impl BackupState {
    pub fn status(&self) -> Option<&BackupStatus> {
        match self {
            BackupState::Enabled { status, .. } => Some(status),
            BackupState::Disabled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online() -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            network: NetworkState::Unmetered,
            ..EnvironmentSnapshot::default()
        }
    }

    fn snapshot(counts: BackupCounts) -> StatusSnapshot {
        StatusSnapshot {
            counts,
            network_type: NetworkType::Connected,
            environment: online(),
            background_dismissed: false,
            persisted_errors: Vec::new(),
        }
    }

    mod counts_tests {
        use super::*;

        #[test]
        fn test_from_state_counts() {
            let histogram = HashMap::from([
                (FileState::Idle, 2),
                (FileState::PossibleDuplicate, 1),
                (FileState::Ready, 4),
                (FileState::Enqueued, 3),
                (FileState::Failed, 1),
                (FileState::Complete, 5),
            ]);
            let counts = BackupCounts::from_state_counts(&histogram);
            assert_eq!(counts.total, 16);
            assert_eq!(counts.preparing, 3);
            assert_eq!(counts.pending, 7);
            assert_eq!(counts.failed, 1);
            assert_eq!(counts.complete, 5);
            assert!(!counts.is_backup_complete());
        }

        #[test]
        fn test_only_complete_is_backup_complete() {
            let histogram = HashMap::from([(FileState::Complete, 9)]);
            assert!(BackupCounts::from_state_counts(&histogram).is_backup_complete());
            assert!(BackupCounts::default().is_backup_complete());
        }
    }

    mod environment_tests {
        use super::*;

        #[test]
        fn test_no_connection() {
            let env = EnvironmentSnapshot::default();
            assert_eq!(
                environment_errors(&env, NetworkType::Connected, false),
                vec![BackupErrorType::Connectivity]
            );
            assert_eq!(
                environment_errors(&env, NetworkType::Unmetered, false),
                vec![BackupErrorType::Connectivity]
            );
        }

        #[test]
        fn test_metered_network_when_unmetered_required() {
            let env = EnvironmentSnapshot {
                network: NetworkState::Connected,
                ..EnvironmentSnapshot::default()
            };
            assert_eq!(
                environment_errors(&env, NetworkType::Unmetered, false),
                vec![BackupErrorType::WifiConnectivity]
            );
            assert!(environment_errors(&env, NetworkType::Connected, false).is_empty());
        }

        #[test]
        fn test_background_restriction_dismissal() {
            let env = EnvironmentSnapshot {
                background_restricted: true,
                ..online()
            };
            assert_eq!(
                environment_errors(&env, NetworkType::Connected, false),
                vec![BackupErrorType::BackgroundRestrictions]
            );
            assert!(environment_errors(&env, NetworkType::Connected, true).is_empty());
        }

        #[test]
        fn test_permission_and_upload_flag() {
            let env = EnvironmentSnapshot {
                permission: PermissionState::Denied,
                uploads_allowed: false,
                ..online()
            };
            assert_eq!(
                environment_errors(&env, NetworkType::Connected, false),
                vec![
                    BackupErrorType::Permissions,
                    BackupErrorType::UploadNotAllowed
                ]
            );
        }
    }

    mod reducer_tests {
        use super::*;

        #[test]
        fn test_status_precedence() {
            let preparing = BackupCounts {
                total: 3,
                preparing: 1,
                pending: 2,
                ..Default::default()
            };
            assert_eq!(reduce_status(&snapshot(preparing)).name(), "Preparing");

            let pending = BackupCounts {
                total: 3,
                pending: 2,
                failed: 1,
                ..Default::default()
            };
            assert_eq!(reduce_status(&snapshot(pending)).name(), "InProgress");

            let failed = BackupCounts {
                total: 3,
                failed: 1,
                complete: 2,
                ..Default::default()
            };
            assert_eq!(reduce_status(&snapshot(failed)).name(), "Uncompleted");

            assert_eq!(
                reduce_status(&snapshot(BackupCounts::default())).name(),
                "Complete"
            );
        }

        #[test]
        fn test_errors_deduplicated_by_type() {
            let mut snap = snapshot(BackupCounts {
                total: 4,
                pending: 4,
                ..Default::default()
            });
            snap.environment.network = NetworkState::None;
            snap.persisted_errors = vec![
                BackupErrorType::Connectivity,
                BackupErrorType::DriveStorage,
                BackupErrorType::DriveStorage,
            ];

            let status = reduce_status(&snap);
            assert_eq!(
                status.errors(),
                &[BackupErrorType::Connectivity, BackupErrorType::DriveStorage]
            );
        }

        #[test]
        fn test_failed_carries_live_counts() {
            let counts = BackupCounts {
                total: 10,
                pending: 6,
                failed: 1,
                complete: 3,
                preparing: 0,
            };
            let mut snap = snapshot(counts);
            snap.persisted_errors = vec![BackupErrorType::DriveStorage];

            match reduce_status(&snap) {
                BackupStatus::Failed { counts: c, .. } => assert_eq!(c, counts),
                other => panic!("expected Failed, got {other:?}"),
            }
        }

        #[test]
        fn test_failed_without_history_keeps_zero_counts() {
            let mut snap = snapshot(BackupCounts::default());
            snap.environment.permission = PermissionState::Denied;
            let status = reduce_status(&snap);
            assert_eq!(status.counts(), &BackupCounts::default());
            assert_eq!(status.errors(), &[BackupErrorType::Permissions]);
        }
    }
}
