//! Dismiss command - hide an error category for an account

use anyhow::{bail, Context, Result};
use clap::Args;
use mediabackup_core::domain::{newtypes::UserId, BackupErrorType};
use mediabackup_core::ports::IBackupRepository;
use tracing::info;

use super::CliContext;
use crate::output::Report;

#[derive(Debug, Args)]
pub struct DismissCommand {
    /// Error type, e.g. `background_restrictions`
    pub error_type: String,

    /// Account the dismissal applies to
    #[arg(long)]
    pub user: String,
}

impl DismissCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let error_type: BackupErrorType = self.error_type.parse()?;
        if !error_type.is_dismissible() {
            bail!("{error_type} errors cannot be dismissed");
        }
        let user_id = UserId::new(self.user.as_str()).context("Invalid user id")?;

        let Some(repository) = ctx.open_repository().await? else {
            return Ok(());
        };
        repository
            .save_dismissal(&user_id, error_type)
            .await
            .context("Failed to save dismissal")?;
        info!(user_id = %user_id, error = %error_type, "Error dismissed");

        let mut report = Report::new(serde_json::json!({
            "success": true,
            "user": user_id.as_str(),
            "dismissed": error_type.as_str(),
        }));
        report.heading(format!("Dismissed {error_type} for {user_id}"));
        ctx.output().print(&report);
        Ok(())
    }
}
