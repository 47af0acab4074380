//! BackupError - a stop condition attached to a folder
//!
//! Errors fall into three categories:
//!
//! | Category      | Types                                                    | Recovery |
//! |---------------|----------------------------------------------------------|----------|
//! | Environmental | Permissions, Connectivity, WifiConnectivity, BackgroundRestrictions | automatic when the signal clears |
//! | Resource      | DriveStorage                                             | explicit retry once space frees up |
//! | Policy        | UploadNotAllowed, Migration                              | server-side condition; Migration never |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::FolderId;

/// Broad recovery class of a [`BackupErrorType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Environmental,
    Resource,
    Policy,
}

/// Kind of condition that stopped (or blocks) a folder's backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupErrorType {
    /// Media read permission denied
    Permissions,
    /// No network connection
    Connectivity,
    /// Connected, but not on the unmetered network the folder requires
    WifiConnectivity,
    /// Not enough device storage to stage uploads
    DriveStorage,
    /// The OS is throttling background work
    BackgroundRestrictions,
    /// The remote share moved; incremental backup is no longer possible
    Migration,
    /// Uploads disabled by a feature flag or the server
    UploadNotAllowed,
    /// Unclassified pipeline failure
    Other,
}

impl BackupErrorType {
    pub const ALL: [BackupErrorType; 8] = [
        BackupErrorType::Permissions,
        BackupErrorType::Connectivity,
        BackupErrorType::WifiConnectivity,
        BackupErrorType::DriveStorage,
        BackupErrorType::BackgroundRestrictions,
        BackupErrorType::Migration,
        BackupErrorType::UploadNotAllowed,
        BackupErrorType::Other,
    ];

    pub fn category(&self) -> ErrorCategory {
        match self {
            BackupErrorType::Permissions
            | BackupErrorType::Connectivity
            | BackupErrorType::WifiConnectivity
            | BackupErrorType::BackgroundRestrictions => ErrorCategory::Environmental,
            BackupErrorType::DriveStorage | BackupErrorType::Other => ErrorCategory::Resource,
            BackupErrorType::Migration | BackupErrorType::UploadNotAllowed => {
                ErrorCategory::Policy
            }
        }
    }

    /// Returns true if an explicit retry may clear the error
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackupErrorType::Migration)
    }

    /// Returns true if the user may hide this error category
    pub fn is_dismissible(&self) -> bool {
        matches!(self, BackupErrorType::BackgroundRestrictions)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupErrorType::Permissions => "permissions",
            BackupErrorType::Connectivity => "connectivity",
            BackupErrorType::WifiConnectivity => "wifi_connectivity",
            BackupErrorType::DriveStorage => "drive_storage",
            BackupErrorType::BackgroundRestrictions => "background_restrictions",
            BackupErrorType::Migration => "migration",
            BackupErrorType::UploadNotAllowed => "upload_not_allowed",
            BackupErrorType::Other => "other",
        }
    }
}

impl fmt::Display for BackupErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupErrorType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackupErrorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "backup error type",
                value: s.to_string(),
            })
    }
}

/// A persisted stop condition for a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupError {
    pub folder_id: FolderId,
    pub error_type: BackupErrorType,
    /// Optional detail for logs and the CLI
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BackupError {
    pub fn new(folder_id: FolderId, error_type: BackupErrorType) -> Self {
        Self {
            folder_id,
            error_type,
            message: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.folder_id)?;
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            BackupErrorType::Permissions.category(),
            ErrorCategory::Environmental
        );
        assert_eq!(
            BackupErrorType::DriveStorage.category(),
            ErrorCategory::Resource
        );
        assert_eq!(BackupErrorType::Migration.category(), ErrorCategory::Policy);
    }

    #[test]
    fn test_only_migration_is_not_retryable() {
        for t in BackupErrorType::ALL {
            assert_eq!(t.is_retryable(), t != BackupErrorType::Migration);
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for t in BackupErrorType::ALL {
            assert_eq!(t.as_str().parse::<BackupErrorType>().unwrap(), t);
        }
        assert!("disk".parse::<BackupErrorType>().is_err());
    }

    #[test]
    fn test_display() {
        let err = BackupError::new(FolderId::new("f1").unwrap(), BackupErrorType::DriveStorage)
            .with_message("12 bytes usable");
        assert_eq!(err.to_string(), "[drive_storage] f1: 12 bytes usable");
    }
}
