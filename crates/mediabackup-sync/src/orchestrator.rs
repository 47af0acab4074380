//! Backup orchestrator - drives the backup pipeline of one account
//!
//! The [`BackupOrchestrator`] owns the use cases of a single account and
//! exposes the folder control operations (enable, disable, retry, stop,
//! configuration changes) together with the pipeline itself:
//!
//! ```text
//! environment gate ──→ scan ──→ find duplicates ──→ check duplicates ──→ upload
//!                                                                          │
//!                                                          cleanup when drained
//! ```
//!
//! Folders are driven one after another. Every step commits to the state
//! store before the next begins, and cancellation is observed between
//! steps, so an interrupted pass resumes from the persisted state.
//!
//! ## Cancellation
//!
//! Each folder pass runs under a child of the account token. Disabling or
//! stopping a folder cancels only that child; cancelling the account token
//! ends every pass and the [`run`](BackupOrchestrator::run) loop.
//!
//! ## Recovery
//!
//! Environment errors are never persisted. The run loop watches the
//! [`SignalHub`] and drives every folder again as soon as permission,
//! connectivity or the upload policy changes. Port failures are logged and
//! leave the folder eligible for the next pass; only explicit stop
//! conditions are stored and wait for a retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use mediabackup_core::config::BackupConfig;
use mediabackup_core::domain::{
    environment_errors,
    newtypes::{BucketId, FileUri, FolderId, UserId},
    BackupConfiguration, BackupError, BackupErrorType, BackupFolder, BackupState, DomainError,
    EnvironmentSnapshot, NetworkState, NetworkType, PermissionState,
};
use mediabackup_core::ports::{
    IBackupRepository, IDeviceInfo, IDuplicateService, IEnvironmentSignals, IEventAnnouncer,
    IHashKeyProvider, ILocalEnumerator, IUploadSubsystem,
};
use mediabackup_core::usecases::{
    BackupControlUseCase, CheckOutcome, CleanupUseCase, FindOutcome, GetBackupStateUseCase,
    ResolveDuplicatesUseCase, ScanFolderUseCase, UploadFolderUseCase, UploadOutcome, UseCaseError,
};

use crate::signals::SignalHub;
use crate::{SyncError, SyncResult};

// ============================================================================
// Ports bundle
// ============================================================================

/// The collaborators an account pipeline is wired with
#[derive(Clone)]
pub struct BackupPorts {
    pub repository: Arc<dyn IBackupRepository + Send + Sync>,
    pub enumerator: Arc<dyn ILocalEnumerator + Send + Sync>,
    pub duplicate_service: Arc<dyn IDuplicateService + Send + Sync>,
    pub upload: Arc<dyn IUploadSubsystem + Send + Sync>,
    pub device: Arc<dyn IDeviceInfo + Send + Sync>,
    pub keys: Arc<dyn IHashKeyProvider + Send + Sync>,
    /// Read by the use cases as a port, watched by the run loop
    pub signals: Arc<SignalHub>,
    pub announcer: Arc<dyn IEventAnnouncer + Send + Sync>,
}

// ============================================================================
// Pass results
// ============================================================================

/// What one completed pipeline pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// New files recorded by the scan
    pub scanned: u64,
    pub find: FindOutcome,
    pub check: CheckOutcome,
    /// `None` only when the pass ended before the upload step
    pub upload: Option<UploadOutcome>,
}

/// Result of [`BackupOrchestrator::sync_folder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pipeline ran to the end
    Completed(PassReport),
    /// Environment conditions prevent uploads; nothing was persisted
    Blocked(Vec<BackupErrorType>),
    /// The folder has persisted errors and waits for a retry
    Halted(Vec<BackupErrorType>),
    /// The pass failed and the folder was stopped with this error
    Stopped(BackupErrorType),
}

/// Why a pass ended early
enum PassError {
    Cancelled,
    Failed(UseCaseError),
}

impl From<UseCaseError> for PassError {
    fn from(e: UseCaseError) -> Self {
        PassError::Failed(e)
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), PassError> {
    if token.is_cancelled() {
        Err(PassError::Cancelled)
    } else {
        Ok(())
    }
}

/// The part of the environment that decides whether a folder may upload
fn upload_gate(snapshot: &EnvironmentSnapshot) -> (PermissionState, NetworkState, bool) {
    (snapshot.permission, snapshot.network, snapshot.uploads_allowed)
}

fn chrono_duration(duration: Duration, what: &str) -> SyncResult<chrono::Duration> {
    chrono::Duration::from_std(duration).map_err(|e| {
        SyncError::UseCase(DomainError::ValidationFailed(format!("{what}: {e}")).into())
    })
}

// ============================================================================
// BackupOrchestrator
// ============================================================================

/// Orchestrates the backups of one account
pub struct BackupOrchestrator {
    user_id: UserId,
    repository: Arc<dyn IBackupRepository + Send + Sync>,
    signals: Arc<SignalHub>,
    scan: ScanFolderUseCase,
    resolve: ResolveDuplicatesUseCase,
    upload: UploadFolderUseCase,
    control: BackupControlUseCase,
    state: GetBackupStateUseCase,
    config: BackupConfig,
    /// Account-wide token; folder tokens are its children
    cancel: CancellationToken,
    folder_tokens: DashMap<FolderId, CancellationToken>,
    /// Wakes the run loop for an immediate pass over all folders
    wake: Notify,
    /// Bumped whenever the store changed in a way the status depends on
    changes: watch::Sender<u64>,
}

impl BackupOrchestrator {
    /// Wires the use cases of `user_id` to `ports`
    pub fn new(
        user_id: UserId,
        ports: BackupPorts,
        config: BackupConfig,
        cancel: CancellationToken,
    ) -> Self {
        let cleanup = Arc::new(CleanupUseCase::new(
            Arc::clone(&ports.repository),
            Arc::clone(&ports.announcer),
        ));
        let scan = ScanFolderUseCase::new(
            Arc::clone(&ports.repository),
            Arc::clone(&ports.enumerator),
            Arc::clone(&ports.keys),
        );
        let resolve = ResolveDuplicatesUseCase::new(
            Arc::clone(&ports.repository),
            Arc::clone(&ports.duplicate_service),
            Arc::clone(&ports.enumerator),
            Arc::clone(&ports.keys),
            Arc::clone(&ports.device),
            config.clone(),
        );
        let upload = UploadFolderUseCase::new(
            Arc::clone(&ports.repository),
            Arc::clone(&ports.upload),
            Arc::clone(&ports.device),
            cleanup,
            config.clone(),
        );
        let control = BackupControlUseCase::new(
            Arc::clone(&ports.repository),
            Arc::clone(&ports.upload),
            Arc::clone(&ports.announcer),
            config.clone(),
        );
        let state = GetBackupStateUseCase::new(
            Arc::clone(&ports.repository),
            Arc::clone(&ports.enumerator),
            Arc::clone(&ports.signals) as Arc<dyn IEnvironmentSignals + Send + Sync>,
        );
        let (changes, _) = watch::channel(0);

        Self {
            user_id,
            repository: ports.repository,
            signals: ports.signals,
            scan,
            resolve,
            upload,
            control,
            state,
            config,
            cancel,
            folder_tokens: DashMap::new(),
            wake: Notify::new(),
            changes,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The account-wide cancellation token
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Receiver bumped after every store change that affects the status
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Asks the run loop for a pass over every folder
    pub fn request_sync(&self) {
        self.wake.notify_one();
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Token for the next pass of `folder_id`, replacing a cancelled one
    fn folder_token(&self, folder_id: &FolderId) -> CancellationToken {
        let mut entry = self
            .folder_tokens
            .entry(folder_id.clone())
            .or_insert_with(|| self.cancel.child_token());
        if entry.is_cancelled() && !self.cancel.is_cancelled() {
            *entry = self.cancel.child_token();
        }
        entry.clone()
    }

    /// Interrupts the running pass of `folder_id`, if any
    fn cancel_folder(&self, folder_id: &FolderId) {
        if let Some((_, token)) = self.folder_tokens.remove(folder_id) {
            token.cancel();
            debug!(folder_id = %folder_id, "Folder pass cancelled");
        }
    }

    // ========================================================================
    // Folder control
    // ========================================================================

    /// Enables backup of `folder_id` from `bucket_id`
    ///
    /// Re-enabling a tracked folder with a different network constraint is
    /// handled as a configuration change.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn enable(
        &self,
        folder_id: &FolderId,
        bucket_id: BucketId,
        network_type: NetworkType,
    ) -> SyncResult<BackupFolder> {
        let configuration =
            BackupConfiguration::new(self.user_id.clone(), folder_id.clone(), network_type);

        if let Some(previous) = self
            .repository
            .get_configuration(&self.user_id, folder_id)
            .await?
        {
            if previous.requires_reset(&configuration) {
                self.cancel_folder(folder_id);
                self.control.reconfigure(&previous, &configuration).await?;
            }
        }

        let folder = self
            .control
            .enable(
                BackupFolder::new(self.user_id.clone(), folder_id.clone(), bucket_id),
                configuration,
            )
            .await?;

        self.notify_changed();
        self.request_sync();
        Ok(folder)
    }

    /// Disables backup of `folder_id`, cancelling only that folder's work
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn disable(&self, folder_id: &FolderId) -> SyncResult<()> {
        self.cancel_folder(folder_id);
        self.control.disable(&self.user_id, folder_id).await?;
        self.notify_changed();
        Ok(())
    }

    /// Clears retryable errors and resets failed files; returns how many
    /// files were reset
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn retry(&self, folder_id: &FolderId) -> SyncResult<u64> {
        let reset = self.control.retry(&self.user_id, folder_id).await?;
        self.notify_changed();
        self.request_sync();
        Ok(reset)
    }

    /// Stops the backup of `folder_id` with `error_type`
    #[instrument(skip(self, message), fields(user_id = %self.user_id))]
    pub async fn stop(
        &self,
        folder_id: &FolderId,
        error_type: BackupErrorType,
        message: Option<String>,
    ) -> SyncResult<()> {
        self.cancel_folder(folder_id);
        let mut error = BackupError::new(folder_id.clone(), error_type);
        error.message = message;
        self.control.stop(&self.user_id, error).await?;
        self.notify_changed();
        Ok(())
    }

    /// Applies a configuration change; returns true if the folder was reset
    #[instrument(skip(self, previous, current), fields(user_id = %self.user_id, folder_id = %current.folder_id))]
    pub async fn on_configuration_changed(
        &self,
        previous: &BackupConfiguration,
        current: &BackupConfiguration,
    ) -> SyncResult<bool> {
        if previous.requires_reset(current) {
            self.cancel_folder(&current.folder_id);
        }
        let reset = self.control.reconfigure(previous, current).await?;
        self.notify_changed();
        self.request_sync();
        Ok(reset)
    }

    /// Hides an error category until its condition clears
    pub async fn dismiss(&self, error_type: BackupErrorType) -> SyncResult<()> {
        self.control.dismiss(&self.user_id, error_type).await?;
        self.notify_changed();
        Ok(())
    }

    /// Aggregated state of one folder
    pub async fn state(&self, folder_id: &FolderId) -> SyncResult<BackupState> {
        Ok(self.state.execute(&self.user_id, folder_id).await?)
    }

    /// Aggregated state of every folder of the account
    pub async fn states(&self) -> SyncResult<Vec<BackupState>> {
        Ok(self.state.execute_all(&self.user_id).await?)
    }

    // ========================================================================
    // Upload outcomes
    // ========================================================================

    /// Records an upload confirmed by the upload subsystem
    pub async fn record_upload_success(&self, folder_id: &FolderId, uri: &FileUri) -> SyncResult<bool> {
        let recorded = self
            .upload
            .record_upload_success(&self.user_id, folder_id, uri)
            .await?;
        if recorded {
            self.notify_changed();
            // a slot was freed
            self.request_sync();
        }
        Ok(recorded)
    }

    /// Records an upload the upload subsystem gave up on
    pub async fn record_upload_failure(&self, folder_id: &FolderId, uri: &FileUri) -> SyncResult<bool> {
        let recorded = self
            .upload
            .record_upload_failure(&self.user_id, folder_id, uri)
            .await?;
        if recorded {
            self.notify_changed();
            self.request_sync();
        }
        Ok(recorded)
    }

    /// Moves uploads stuck in `Enqueued` past the timeout to `Failed`
    pub async fn reconcile_stale_enqueued(&self) -> SyncResult<u64> {
        let reconciled = self.control.reconcile_stale_enqueued(&self.user_id).await?;
        if reconciled > 0 {
            self.notify_changed();
        }
        Ok(reconciled)
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Runs one pipeline pass for `folder_id`
    ///
    /// A step that hits a stop condition stops the folder with it and
    /// returns [`PassOutcome::Stopped`]. The folder's sync time only moves
    /// when the pass enqueued files or drained the folder.
    ///
    /// # Errors
    ///
    /// `SyncError::Cancelled` if the folder or account was cancelled, and
    /// `SyncError::FolderNotFound` if the folder is not backed up. Any other
    /// failure is returned as is and persists nothing.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn sync_folder(&self, folder_id: &FolderId) -> SyncResult<PassOutcome> {
        let token = self.folder_token(folder_id);
        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let folder = self
            .repository
            .get_folder(&self.user_id, folder_id)
            .await?
            .ok_or_else(|| SyncError::FolderNotFound(folder_id.clone()))?;

        let persisted: Vec<BackupErrorType> = self
            .repository
            .get_errors(&self.user_id, folder_id)
            .await?
            .into_iter()
            .map(|e| e.error_type)
            .collect();
        if !persisted.is_empty() {
            debug!(folder_id = %folder_id, errors = ?persisted, "Folder stopped, waiting for retry");
            return Ok(PassOutcome::Halted(persisted));
        }

        let network_type = self
            .repository
            .get_configuration(&self.user_id, folder_id)
            .await?
            .map(|c| c.network_type)
            .unwrap_or_default();
        // background restrictions slow uploads down but never gate them
        let blocking = environment_errors(&self.signals.snapshot(), network_type, true);
        if blocking.contains(&BackupErrorType::UploadNotAllowed) {
            self.control
                .stop(
                    &self.user_id,
                    BackupError::new(folder_id.clone(), BackupErrorType::UploadNotAllowed),
                )
                .await?;
            self.notify_changed();
            return Ok(PassOutcome::Stopped(BackupErrorType::UploadNotAllowed));
        }
        if !blocking.is_empty() {
            debug!(folder_id = %folder_id, errors = ?blocking, "Environment blocks backup");
            return Ok(PassOutcome::Blocked(blocking));
        }

        info!(folder_id = %folder_id, bucket_id = %folder.bucket_id(), "Backup pass started");
        let result = self.run_pass(&folder, &token).await;
        self.notify_changed();

        match result {
            Ok(report) => {
                if !matches!(report.upload, Some(UploadOutcome::Throttled { .. }) | None) {
                    self.repository
                        .update_sync_time(&self.user_id, folder_id, Utc::now())
                        .await?;
                }
                info!(
                    folder_id = %folder_id,
                    scanned = report.scanned,
                    duplicated = report.check.duplicated,
                    "Backup pass finished"
                );
                Ok(PassOutcome::Completed(report))
            }
            Err(PassError::Cancelled) => {
                debug!(folder_id = %folder_id, "Backup pass interrupted");
                Err(SyncError::Cancelled)
            }
            Err(PassError::Failed(_)) if token.is_cancelled() => {
                // the folder was disabled or stopped underneath the pass
                Err(SyncError::Cancelled)
            }
            Err(PassError::Failed(e)) => match e.stop_error_type() {
                Some(error_type) => {
                    error!(folder_id = %folder_id, error = %e, kind = %error_type, "Backup stopped");
                    self.control
                        .stop(
                            &self.user_id,
                            BackupError::new(folder_id.clone(), error_type)
                                .with_message(e.to_string()),
                        )
                        .await?;
                    self.notify_changed();
                    Ok(PassOutcome::Stopped(error_type))
                }
                None => {
                    warn!(folder_id = %folder_id, error = %e, "Backup pass failed, next pass resumes");
                    Err(e.into())
                }
            },
        }
    }

    async fn run_pass(
        &self,
        folder: &BackupFolder,
        token: &CancellationToken,
    ) -> Result<PassReport, PassError> {
        let mut report = PassReport::default();

        checkpoint(token)?;
        report.scanned = self.scan.execute(folder).await?;

        // the scan advanced the watermark
        let folder = self
            .repository
            .get_folder(folder.user_id(), folder.folder_id())
            .await
            .map_err(UseCaseError::from)?
            .ok_or_else(|| UseCaseError::NotFound(folder.folder_id().clone()))?;

        checkpoint(token)?;
        report.find = self.resolve.find_duplicates(&folder).await?;

        checkpoint(token)?;
        report.check = self.resolve.check_duplicates(&folder).await?;

        checkpoint(token)?;
        report.upload = Some(self.upload.execute(&folder).await?);

        Ok(report)
    }

    /// Runs a pass for each folder in order; folder failures are logged
    async fn drive(&self, folders: &[BackupFolder]) -> SyncResult<Vec<(FolderId, PassOutcome)>> {
        let mut outcomes = Vec::with_capacity(folders.len());
        for folder in folders {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let folder_id = folder.folder_id();
            match self.sync_folder(folder_id).await {
                Ok(outcome) => outcomes.push((folder_id.clone(), outcome)),
                Err(SyncError::Cancelled) if self.cancel.is_cancelled() => {
                    return Err(SyncError::Cancelled)
                }
                Err(SyncError::Cancelled | SyncError::FolderNotFound(_)) => {
                    debug!(folder_id = %folder_id, "Folder went away during the pass");
                }
                Err(e) => {
                    error!(folder_id = %folder_id, error = %e, "Folder pass could not complete");
                }
            }
        }
        Ok(outcomes)
    }

    /// Runs a pass over every folder of the account
    pub async fn sync_all(&self) -> SyncResult<Vec<(FolderId, PassOutcome)>> {
        let folders = self.repository.list_folders(&self.user_id).await?;
        self.drive(&folders).await
    }

    /// Re-triggers folders whose last completed pass is older than the
    /// configured window; returns the folders that were driven
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn sweep_stale_folders(&self) -> SyncResult<Vec<FolderId>> {
        let window = chrono_duration(self.config.stale_sync_window(), "stale sync window")?;
        let stale = self
            .repository
            .get_stale_folders(&self.user_id, Utc::now() - window)
            .await?;
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        info!(count = stale.len(), "Sweeping stale folders");
        let swept = self
            .drive(&stale)
            .await?
            .into_iter()
            .map(|(folder_id, _)| folder_id)
            .collect();
        Ok(swept)
    }

    /// The account task: reconciles orphaned uploads, runs an initial pass,
    /// then serves sync requests, environment changes and periodic sweeps
    /// until cancelled
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn run(&self) -> SyncResult<()> {
        info!("Account backup task started");

        // subscribed first so a change during the initial pass is not lost
        let mut environment = self.signals.subscribe();
        let mut gate = upload_gate(&environment.borrow_and_update());

        match self.reconcile_stale_enqueued().await {
            Ok(0) => {}
            Ok(reconciled) => info!(reconciled, "Orphaned uploads reconciled"),
            Err(e) => warn!(error = %e, "Failed to reconcile orphaned uploads"),
        }

        let period = self.config.sweep_interval().max(Duration::from_secs(1));
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the initial pass covers it
        sweep.tick().await;

        if let Err(e) = self.sync_all().await {
            self.log_loop_error(&e);
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => {
                    if let Err(e) = self.sync_all().await {
                        self.log_loop_error(&e);
                    }
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_stale_folders().await {
                        self.log_loop_error(&e);
                    }
                }
                changed = environment.changed() => {
                    if changed.is_err() {
                        warn!("Environment signals closed");
                        break;
                    }
                    let current = upload_gate(&environment.borrow_and_update());
                    if current == gate {
                        continue;
                    }
                    gate = current;
                    debug!(?gate, "Upload conditions changed");
                    if let Err(e) = self.sync_all().await {
                        self.log_loop_error(&e);
                    }
                }
            }
        }

        info!("Account backup task stopped");
        Ok(())
    }

    fn log_loop_error(&self, e: &SyncError) {
        match e {
            SyncError::Cancelled => debug!("Pass interrupted by cancellation"),
            other => error!(error = %other, "Account pass failed"),
        }
    }
}
