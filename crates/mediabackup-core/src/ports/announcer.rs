//! Event announcer port (driven/secondary port)
//!
//! Fire-and-forget delivery of UI-facing backup events. Announcing never
//! fails from the caller's point of view and never blocks the pipeline.

use crate::domain::{newtypes::UserId, BackupEvent};

/// Port trait for UI-facing event delivery
pub trait IEventAnnouncer: Send + Sync {
    fn announce(&self, user_id: &UserId, event: BackupEvent);
}
