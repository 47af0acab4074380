//! MediaBackup CLI - operator interface to the backup state store
//!
//! Provides commands for:
//! - Viewing the aggregated backup state of every folder
//! - Listing tracked folders and persisted errors
//! - Dismissing errors and reconciling orphaned uploads
//! - Inspecting and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mediabackup_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, dismiss::DismissCommand, errors::ErrorsCommand,
    folders::FoldersCommand, reconcile::ReconcileCommand, status::StatusCommand, CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "mediabackup", version, about = "Local media backup engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the backup state of every folder
    Status(StatusCommand),
    /// List backed up folders and their watermarks
    Folders(FoldersCommand),
    /// List persisted backup errors
    Errors(ErrorsCommand),
    /// Hide an error category until its condition clears
    Dismiss(DismissCommand),
    /// Mark uploads stuck in the enqueued state as failed
    Reconcile(ReconcileCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Log filter directive: `-v` overrides the configured level
fn log_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let level = log_level(cli.verbose, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext {
        format,
        config,
        config_path,
    };

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Folders(cmd) => cmd.execute(&ctx).await,
        Commands::Errors(cmd) => cmd.execute(&ctx).await,
        Commands::Dismiss(cmd) => cmd.execute(&ctx).await,
        Commands::Reconcile(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
