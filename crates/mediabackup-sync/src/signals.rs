//! Environment signals and live status
//!
//! [`SignalHub`] is the push side of the environment: platform adapters
//! publish permission, connectivity and restriction changes into a
//! `tokio::sync::watch` channel, and the core reads snapshots through the
//! [`IEnvironmentSignals`] port.
//!
//! [`StatusWatcher`] keeps a folder's aggregated [`BackupState`] current by
//! recomputing it whenever the environment or the state store changes.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mediabackup_core::domain::{
    newtypes::FolderId, BackupState, EnvironmentSnapshot, NetworkState, PermissionState,
};
use mediabackup_core::ports::IEnvironmentSignals;

use crate::orchestrator::BackupOrchestrator;

// ============================================================================
// SignalHub
// ============================================================================

/// Publishes environment snapshots to subscribers
pub struct SignalHub {
    tx: watch::Sender<EnvironmentSnapshot>,
}

impl SignalHub {
    pub fn new(initial: EnvironmentSnapshot) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Receiver notified on every effective change
    pub fn subscribe(&self) -> watch::Receiver<EnvironmentSnapshot> {
        self.tx.subscribe()
    }

    /// Replaces the whole snapshot
    pub fn publish(&self, snapshot: EnvironmentSnapshot) {
        self.update(|current| *current = snapshot);
    }

    /// Applies `f` to the current snapshot, notifying only if it changed
    pub fn update(&self, f: impl FnOnce(&mut EnvironmentSnapshot)) {
        let changed = self.tx.send_if_modified(|current| {
            let before = *current;
            f(current);
            *current != before
        });
        if changed {
            debug!(snapshot = ?*self.tx.borrow(), "Environment changed");
        }
    }

    pub fn set_network(&self, network: NetworkState) {
        self.update(|s| s.network = network);
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.update(|s| s.permission = permission);
    }

    pub fn set_background_restricted(&self, restricted: bool) {
        self.update(|s| s.background_restricted = restricted);
    }

    pub fn set_uploads_allowed(&self, allowed: bool) {
        self.update(|s| s.uploads_allowed = allowed);
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(EnvironmentSnapshot::default())
    }
}

impl IEnvironmentSignals for SignalHub {
    fn snapshot(&self) -> EnvironmentSnapshot {
        *self.tx.borrow()
    }
}

// ============================================================================
// StatusWatcher
// ============================================================================

/// Recomputes a folder's state on environment or store changes
pub struct StatusWatcher {
    orchestrator: Arc<BackupOrchestrator>,
    folder_id: FolderId,
    environment: watch::Receiver<EnvironmentSnapshot>,
    changes: watch::Receiver<u64>,
    tx: watch::Sender<Option<BackupState>>,
}

impl StatusWatcher {
    /// Creates a watcher and the receiver its states are published on
    ///
    /// The receiver holds `None` until the first computation.
    pub fn new(
        orchestrator: Arc<BackupOrchestrator>,
        hub: &SignalHub,
        folder_id: FolderId,
    ) -> (Self, watch::Receiver<Option<BackupState>>) {
        let (tx, rx) = watch::channel(None);
        let changes = orchestrator.subscribe_changes();
        let watcher = Self {
            orchestrator,
            folder_id,
            environment: hub.subscribe(),
            changes,
            tx,
        };
        (watcher, rx)
    }

    /// Recomputes the state once and publishes it if it changed
    pub async fn refresh(&self) -> crate::SyncResult<()> {
        let state = self.orchestrator.state(&self.folder_id).await?;
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&state) {
                false
            } else {
                *current = Some(state);
                true
            }
        });
        Ok(())
    }

    /// Publishes fresh states until `cancel` fires or a source closes
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = self.refresh().await {
            warn!(folder_id = %self.folder_id, error = %e, "Failed to compute backup state");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.environment.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if let Err(e) = self.refresh().await {
                warn!(folder_id = %self.folder_id, error = %e, "Failed to compute backup state");
            }
        }

        debug!(folder_id = %self.folder_id, "Status watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_updates() {
        let hub = SignalHub::default();
        assert_eq!(hub.snapshot().network, NetworkState::None);

        hub.set_network(NetworkState::Unmetered);
        hub.set_background_restricted(true);

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.network, NetworkState::Unmetered);
        assert!(snapshot.background_restricted);
    }

    #[tokio::test]
    async fn test_subscribers_only_see_effective_changes() {
        let hub = SignalHub::default();
        let mut rx = hub.subscribe();

        hub.set_permission(PermissionState::Granted);
        assert!(!rx.has_changed().unwrap());

        hub.set_uploads_allowed(false);
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert!(!rx.borrow().uploads_allowed);
    }
}
