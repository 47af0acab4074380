//! Folders command - tracked folders and their watermarks

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use mediabackup_core::ports::IBackupRepository;
use tracing::info;

use super::{format_time, resolve_users, CliContext};
use crate::output::Report;

#[derive(Debug, Args)]
pub struct FoldersCommand {
    /// Only this account
    #[arg(long)]
    pub user: Option<String>,
}

impl FoldersCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let Some(repository) = ctx.open_repository().await? else {
            return Ok(());
        };

        let window = chrono::Duration::from_std(ctx.config.backup.stale_sync_window())
            .context("Stale sync window out of range")?;
        let now = Utc::now();

        let mut rows = Vec::new();
        for user_id in resolve_users(&repository, self.user.as_deref()).await? {
            let folders = repository
                .list_folders(&user_id)
                .await
                .context("Failed to list folders")?;
            info!(user_id = %user_id, count = folders.len(), "Listing folders");

            for folder in folders {
                let network_type = repository
                    .get_configuration(&user_id, folder.folder_id())
                    .await
                    .context("Failed to read folder configuration")?
                    .map(|c| c.network_type)
                    .unwrap_or_default();
                let files: u64 = repository
                    .count_files_by_state(&user_id, folder.folder_id())
                    .await
                    .context("Failed to count files")?
                    .values()
                    .sum();
                rows.push((user_id.clone(), folder, network_type, files));
            }
        }

        let json: Vec<_> = rows
            .iter()
            .map(|(user_id, folder, network_type, files)| {
                serde_json::json!({
                    "user": user_id.as_str(),
                    "folder": folder.folder_id().as_str(),
                    "bucket": folder.bucket_id().get(),
                    "network_type": network_type.as_str(),
                    "tracked_files": files,
                    "update_time": folder.update_time().map(|t| t.to_rfc3339()),
                    "sync_time": folder.sync_time().map(|t| t.to_rfc3339()),
                    "stale": folder.is_stale(now, window),
                })
            })
            .collect();
        let mut report = Report::new(serde_json::Value::Array(json));

        if rows.is_empty() {
            report.detail("No backup folders");
        } else {
            report.heading(format!("{} backup folder(s)", rows.len()));
        }
        for (user_id, folder, network_type, files) in &rows {
            let stale = if folder.is_stale(now, window) {
                " [stale]"
            } else {
                ""
            };
            report
                .blank()
                .detail(format!(
                    "{user_id}/{} (bucket {}, {network_type}){stale}",
                    folder.folder_id(),
                    folder.bucket_id()
                ))
                .detail(format!("  Tracked files: {files}"))
                .detail(format!(
                    "  Scanned up to: {}",
                    format_time(folder.update_time(), "never")
                ))
                .detail(format!(
                    "  Last sync:     {}",
                    format_time(folder.sync_time(), "never")
                ));
        }

        ctx.output().print(&report);
        Ok(())
    }
}
