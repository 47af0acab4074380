//! Errors command - persisted stop conditions

use anyhow::{Context, Result};
use clap::Args;
use mediabackup_core::ports::IBackupRepository;

use super::{resolve_users, CliContext};
use crate::output::{error_json, error_lines, Report};

#[derive(Debug, Args)]
pub struct ErrorsCommand {
    /// Only this account
    #[arg(long)]
    pub user: Option<String>,
}

impl ErrorsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let Some(repository) = ctx.open_repository().await? else {
            return Ok(());
        };

        let mut rows = Vec::new();
        for user_id in resolve_users(&repository, self.user.as_deref()).await? {
            let errors = repository
                .list_errors(&user_id)
                .await
                .context("Failed to list errors")?;
            rows.extend(errors.into_iter().map(|e| (user_id.clone(), e)));
        }

        let json: Vec<_> = rows
            .iter()
            .map(|(user_id, error)| error_json(user_id, error))
            .collect();
        let mut report = Report::new(serde_json::Value::Array(json));

        if rows.is_empty() {
            report.heading("No backup errors");
        } else {
            report.problem(format!("{} backup error(s):", rows.len()));
        }
        for (user_id, error) in &rows {
            report.lines.extend(error_lines(user_id, error));
        }

        ctx.output().print(&report);
        Ok(())
    }
}
