//! Device ports (driven/secondary ports)
//!
//! Small capabilities provided by the host platform: storage and client
//! identity, hashing keys, and the environment signals (permission,
//! connectivity, background restrictions) the backup status depends on.

use crate::domain::{
    newtypes::{ClientUid, FolderId, UserId},
    EnvironmentSnapshot,
};

/// Storage and identity of this device
#[async_trait::async_trait]
pub trait IDeviceInfo: Send + Sync {
    /// Free bytes on the volume uploads are staged from
    async fn available_bytes(&self) -> anyhow::Result<u64>;

    /// Stable identifier of this device as an upload client
    fn client_uid(&self) -> ClientUid;
}

/// Per-folder secrets used for keyed hashing
#[async_trait::async_trait]
pub trait IHashKeyProvider: Send + Sync {
    /// Key for name hashes
    async fn name_key(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<Vec<u8>>;

    /// Key for content hashes
    async fn node_key(&self, user_id: &UserId, folder_id: &FolderId) -> anyhow::Result<Vec<u8>>;
}

/// Current environment signals
///
/// Implementations publish changes through their own channel; the core
/// only ever reads a snapshot.
pub trait IEnvironmentSignals: Send + Sync {
    fn snapshot(&self) -> EnvironmentSnapshot;
}
