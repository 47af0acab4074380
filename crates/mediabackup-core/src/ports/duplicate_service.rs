//! Remote duplicate service port (driven/secondary port)
//!
//! Looks up remote files by keyed name hash so duplicates are found without
//! sending plaintext names.

use crate::domain::{
    newtypes::{ClientUid, FolderId, LinkId, NameHash},
    BackupDuplicate,
};

/// Port trait for the remote duplicate lookup
#[async_trait::async_trait]
pub trait IDuplicateService: Send + Sync {
    /// Remote files under `folder_id` sharing one of `name_hashes`
    ///
    /// `client_uids` identifies this device so drafts it left behind can
    /// be told apart from other clients' files.
    async fn find_duplicates(
        &self,
        folder_id: &FolderId,
        name_hashes: &[NameHash],
        client_uids: &[ClientUid],
    ) -> anyhow::Result<Vec<BackupDuplicate>>;

    /// Deletes stale remote drafts
    async fn delete_drafts(&self, folder_id: &FolderId, link_ids: &[LinkId])
        -> anyhow::Result<()>;
}
