//! Domain entities and business logic
//!
//! This module contains the core domain types for the backup engine:
//! - Newtypes for identifiers and validated hashes
//! - Backup folders, configurations and the per-file state machine
//! - Remote duplicate candidates
//! - Persisted backup errors and the derived status reducer
//! - UI-facing events
//! - Domain-specific error types

pub mod backup_error;
pub mod backup_file;
pub mod backup_folder;
pub mod duplicate;
pub mod errors;
pub mod event;
pub mod newtypes;
pub mod status;

// Re-export commonly used types
pub use backup_error::{BackupError, BackupErrorType, ErrorCategory};
pub use backup_file::{BackupFile, FileState};
pub use backup_folder::{BackupConfiguration, BackupFolder, NetworkState, NetworkType};
pub use duplicate::{BackupDuplicate, LinkState};
pub use errors::DomainError;
pub use event::BackupEvent;
pub use newtypes::*;
pub use status::{
    environment_errors, reduce_status, BackupCounts, BackupState, BackupStatus,
    EnvironmentSnapshot, PermissionState, StatusSnapshot,
};
