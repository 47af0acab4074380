//! Status command - aggregated backup state per folder
//!
//! Provides the `mediabackup status` CLI command which recomputes each
//! folder's [`BackupState`] from the state store. The CLI has no live view
//! of the platform, so the environment is taken from the flags (an
//! unmetered connection by default) and only the network and restriction
//! errors they imply are added to the persisted ones.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use mediabackup_core::domain::{
    newtypes::{FolderId, UserId},
    BackupState, EnvironmentSnapshot, NetworkState,
};
use mediabackup_core::usecases::GetBackupStateUseCase;
use mediabackup_sync::{DirectoryEnumerator, SignalHub};
use tracing::info;

use super::{resolve_users, CliContext};
use crate::output::{state_lines, Report};

/// Connectivity assumed for the status computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkArg {
    None,
    Connected,
    Unmetered,
}

impl From<NetworkArg> for NetworkState {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::None => NetworkState::None,
            NetworkArg::Connected => NetworkState::Connected,
            NetworkArg::Unmetered => NetworkState::Unmetered,
        }
    }
}

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only this account
    #[arg(long)]
    pub user: Option<String>,

    /// Only this folder
    #[arg(long)]
    pub folder: Option<String>,

    /// Connectivity to evaluate the folders against
    #[arg(long, value_enum, default_value = "unmetered")]
    pub network: NetworkArg,

    /// Evaluate as if background work were restricted
    #[arg(long)]
    pub background_restricted: bool,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let Some(repository) = ctx.open_repository().await? else {
            return Ok(());
        };
        let repository = Arc::new(repository);

        let hub = Arc::new(SignalHub::new(EnvironmentSnapshot {
            network: self.network.into(),
            background_restricted: self.background_restricted,
            ..EnvironmentSnapshot::default()
        }));
        let enumerator = Arc::new(DirectoryEnumerator::from_config(&ctx.config));
        let use_case = GetBackupStateUseCase::new(repository.clone(), enumerator, hub);

        let folder = self
            .folder
            .as_deref()
            .map(FolderId::new)
            .transpose()
            .context("Invalid folder id")?;

        let mut accounts = Vec::new();
        for user_id in resolve_users(&*repository, self.user.as_deref()).await? {
            info!(user_id = %user_id, "Computing backup state");
            let states = match &folder {
                Some(folder_id) => vec![use_case
                    .execute(&user_id, folder_id)
                    .await
                    .context("Failed to compute backup state")?],
                None => use_case
                    .execute_all(&user_id)
                    .await
                    .context("Failed to compute backup states")?,
            };
            accounts.push((user_id, states));
        }

        ctx.output().print(&report(&accounts));
        Ok(())
    }
}

fn report(accounts: &[(UserId, Vec<BackupState>)]) -> Report {
    let json: Vec<_> = accounts
        .iter()
        .map(|(user_id, states)| {
            serde_json::json!({
                "user": user_id.as_str(),
                "folders": states,
            })
        })
        .collect();
    let mut report = Report::new(serde_json::Value::Array(json));

    if accounts.is_empty() {
        report.detail("No backup folders");
    }
    for (user_id, states) in accounts {
        report.heading(format!("Account {user_id}"));
        if states.is_empty() {
            report.detail("No backup folders");
        }
        report.lines.extend(states.iter().flat_map(state_lines));
        report.blank();
    }
    report
}
