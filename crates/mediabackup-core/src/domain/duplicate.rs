//! BackupDuplicate - a remote candidate match for a local file
//!
//! Duplicates are fetched per resolution pass. They are kept in the state
//! store only while the content check for the matching local files is
//! pending, and discarded by cleanup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, FolderId, LinkId, NameHash};

/// Remote lifecycle of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Created but never confirmed complete by any client
    Draft,
    /// Uploaded and live
    Active,
    /// In the remote trash
    Trashed,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Draft => "draft",
            LinkState::Active => "active",
            LinkState::Trashed => "trashed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(LinkState::Draft),
            "active" => Ok(LinkState::Active),
            "trashed" => Ok(LinkState::Trashed),
            other => Err(DomainError::UnknownVariant {
                kind: "link state",
                value: other.to_string(),
            }),
        }
    }
}

/// A remote file sharing a name hash with a local file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDuplicate {
    /// Store row id, `None` until persisted
    pub id: Option<i64>,
    pub folder_id: FolderId,
    pub link_id: LinkId,
    pub hash: NameHash,
    pub content_hash: Option<ContentHash>,
    pub link_state: LinkState,
}

impl BackupDuplicate {
    pub fn new(
        folder_id: FolderId,
        link_id: LinkId,
        hash: NameHash,
        content_hash: Option<ContentHash>,
        link_state: LinkState,
    ) -> Self {
        Self {
            id: None,
            folder_id,
            link_id,
            hash,
            content_hash,
            link_state,
        }
    }

    /// An incomplete earlier upload by this or another client
    pub fn is_draft(&self) -> bool {
        self.link_state == LinkState::Draft
    }

    /// Returns true if this remote file has exactly `content`
    ///
    /// Drafts never match: their content was never confirmed.
    pub fn matches_content(&self, content: &ContentHash) -> bool {
        !self.is_draft() && self.content_hash.as_ref() == Some(content)
    }
}
