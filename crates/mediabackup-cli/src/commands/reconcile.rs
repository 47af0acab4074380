//! Reconcile command - fail uploads orphaned in the enqueued state
//!
//! Uploads stay `Enqueued` until the upload subsystem reports back. When
//! that report never arrives (the process died, the queue was wiped), this
//! command moves them to `Failed` so the next pass can retry them.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use mediabackup_core::ports::IBackupRepository;
use tracing::info;

use super::{resolve_users, CliContext};
use crate::output::Report;

#[derive(Debug, Args)]
pub struct ReconcileCommand {
    /// Only this account
    #[arg(long)]
    pub user: Option<String>,

    /// Override the configured timeout, in seconds
    #[arg(long)]
    pub older_than_secs: Option<u64>,
}

impl ReconcileCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let Some(repository) = ctx.open_repository().await? else {
            return Ok(());
        };

        let timeout = match self.older_than_secs {
            Some(secs) => std::time::Duration::from_secs(secs),
            None => ctx.config.backup.enqueued_timeout(),
        };
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).context("Timeout out of range")?;

        let mut total = 0;
        let mut per_user = Vec::new();
        for user_id in resolve_users(&repository, self.user.as_deref()).await? {
            let reconciled = repository
                .reconcile_stale_enqueued(&user_id, cutoff)
                .await
                .context("Failed to reconcile enqueued uploads")?;
            info!(user_id = %user_id, reconciled, "Enqueued uploads reconciled");
            total += reconciled;
            per_user.push((user_id, reconciled));
        }

        let accounts: Vec<_> = per_user
            .iter()
            .map(|(user_id, n)| serde_json::json!({"user": user_id.as_str(), "reconciled": n}))
            .collect();
        let mut report = Report::new(serde_json::json!({
            "reconciled": total,
            "accounts": accounts,
        }));
        if total == 0 {
            report.heading("No orphaned uploads");
        } else {
            report.heading(format!("{total} orphaned upload(s) marked failed"));
            for (user_id, n) in per_user.iter().filter(|(_, n)| *n > 0) {
                report.detail(format!("{user_id}: {n}"));
            }
        }
        ctx.output().print(&report);
        Ok(())
    }
}
