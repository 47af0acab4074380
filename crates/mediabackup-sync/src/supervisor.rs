//! Account supervisor
//!
//! Keeps one [`BackupOrchestrator`] task per ready account. The registry is
//! keyed by account id; starting an account that already runs cancels and
//! awaits the old task before the new one is spawned, and removing an
//! account cancels everything it was doing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mediabackup_core::config::BackupConfig;
use mediabackup_core::domain::newtypes::UserId;

use crate::orchestrator::{BackupOrchestrator, BackupPorts};
use crate::{SyncError, SyncResult};

/// Account lifecycle notifications from the account provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// The account is signed in and its keys are available
    Ready(UserId),
    /// The account was signed out or deleted
    Removed(UserId),
}

struct AccountHandle {
    orchestrator: Arc<BackupOrchestrator>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl AccountHandle {
    /// Cancels the account task and waits for it to finish
    async fn shutdown(self) {
        let user_id = self.orchestrator.user_id().clone();
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!(user_id = %user_id, error = %e, "Account task ended abnormally");
        }
    }
}

/// Registry of per-account backup tasks
pub struct BackupSupervisor {
    ports: BackupPorts,
    config: BackupConfig,
    accounts: DashMap<UserId, AccountHandle>,
    shutdown: CancellationToken,
}

impl BackupSupervisor {
    /// Creates a supervisor; account tokens are children of `shutdown`
    pub fn new(ports: BackupPorts, config: BackupConfig, shutdown: CancellationToken) -> Self {
        Self {
            ports,
            config,
            accounts: DashMap::new(),
            shutdown,
        }
    }

    /// Starts (or restarts) the backup task of `user_id`
    pub async fn start_account(&self, user_id: UserId) -> Arc<BackupOrchestrator> {
        if let Some((_, previous)) = self.accounts.remove(&user_id) {
            info!(user_id = %user_id, "Restarting account backup task");
            previous.shutdown().await;
        }

        let token = self.shutdown.child_token();
        let orchestrator = Arc::new(BackupOrchestrator::new(
            user_id.clone(),
            self.ports.clone(),
            self.config.clone(),
            token.clone(),
        ));

        let task = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move {
                if let Err(e) = orchestrator.run().await {
                    error!(user_id = %orchestrator.user_id(), error = %e, "Account backup task failed");
                }
            }
        });

        let handle = AccountHandle {
            orchestrator: Arc::clone(&orchestrator),
            token,
            task,
        };
        if let Some(raced) = self.accounts.insert(user_id.clone(), handle) {
            // a concurrent start won the slot first; its task must not survive
            warn!(user_id = %user_id, "Concurrent account start, cancelling the other task");
            raced.token.cancel();
        }

        info!(user_id = %user_id, "Account backup task registered");
        orchestrator
    }

    /// Cancels and awaits the task of `user_id`; returns false if none ran
    pub async fn remove_account(&self, user_id: &UserId) -> bool {
        match self.accounts.remove(user_id) {
            Some((_, handle)) => {
                handle.shutdown().await;
                info!(user_id = %user_id, "Account backup task removed");
                true
            }
            None => false,
        }
    }

    /// The orchestrator of a registered account
    ///
    /// # Errors
    ///
    /// `SyncError::AccountNotRunning` if no task is registered for `user_id`.
    pub fn orchestrator(&self, user_id: &UserId) -> SyncResult<Arc<BackupOrchestrator>> {
        self.accounts
            .get(user_id)
            .map(|handle| Arc::clone(&handle.orchestrator))
            .ok_or_else(|| SyncError::AccountNotRunning(user_id.clone()))
    }

    pub fn is_running(&self, user_id: &UserId) -> bool {
        self.accounts
            .get(user_id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Accounts with a registered task
    pub fn accounts(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.accounts.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Applies one account event
    pub async fn handle_event(&self, event: AccountEvent) {
        match event {
            AccountEvent::Ready(user_id) => {
                self.start_account(user_id).await;
            }
            AccountEvent::Removed(user_id) => {
                if !self.remove_account(&user_id).await {
                    warn!(user_id = %user_id, "Removal of an account without a backup task");
                }
            }
        }
    }

    /// Consumes account events until the channel closes or shutdown fires,
    /// then stops every account
    pub async fn run(&self, mut events: mpsc::Receiver<AccountEvent>) {
        info!("Backup supervisor started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        self.shutdown_all().await;
        info!("Backup supervisor stopped");
    }

    /// Cancels and awaits every account task
    pub async fn shutdown_all(&self) {
        for user_id in self.accounts() {
            if let Some((_, handle)) = self.accounts.remove(&user_id) {
                handle.shutdown().await;
            }
        }
    }
}
