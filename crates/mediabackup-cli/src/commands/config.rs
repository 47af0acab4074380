//! Config command - view and validate the configuration
//!
//! Provides the `mediabackup config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports every error found

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use mediabackup_core::config::Config;
use tracing::info;

use super::CliContext;
use crate::output::Report;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        info!(config_path = %ctx.config_path.display(), "Showing configuration");
        ctx.output().print(&show_report(ctx)?);
        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        ctx.output().print(&validate_report(&ctx.config_path));
        Ok(())
    }
}

fn show_report(ctx: &CliContext) -> Result<Report> {
    let json =
        serde_json::to_value(&ctx.config).context("Failed to serialize configuration to JSON")?;
    let yaml =
        serde_yaml::to_string(&ctx.config).context("Failed to serialize configuration to YAML")?;

    let mut report = Report::new(json);
    report.heading(format!("Configuration ({})", ctx.config_path.display()));
    if !ctx.config_path.exists() {
        report.detail("(file not found, showing defaults)");
    }
    report.blank();
    for line in yaml.lines() {
        report.detail(line);
    }
    Ok(report)
}

/// Loads the file again rather than trusting the context, which silently
/// falls back to defaults
fn validate_report(path: &Path) -> Report {
    let errors: Vec<String> = match Config::load(path) {
        Ok(config) => config.validate().iter().map(ToString::to_string).collect(),
        Err(e) => vec![format!("Failed to load {}: {e}", path.display())],
    };

    let mut report = Report::new(serde_json::json!({
        "valid": errors.is_empty(),
        "config_path": path.display().to_string(),
        "errors": errors,
    }));
    if errors.is_empty() {
        report.heading(format!("Configuration is valid ({})", path.display()));
    } else {
        report.problem(format!("{} problem(s) in {}", errors.len(), path.display()));
        for error in &errors {
            report.detail(error.as_str());
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Line, OutputFormat};
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, yaml).unwrap();
        config_path
    }

    #[test]
    fn test_validate_lists_every_problem() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "backup:\n  upload_limit_threshold: 0\nlogging:\n  level: loud\n",
        );

        let report = validate_report(&path);
        assert_eq!(report.json["valid"], false);
        let errors = report.json["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0]
            .as_str()
            .unwrap()
            .starts_with("backup.upload_limit_threshold"));
        assert!(matches!(report.lines[0], Line::Problem(_)));
    }

    #[test]
    fn test_validate_reports_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let report = validate_report(&dir.path().join("absent.yaml"));

        assert_eq!(report.json["valid"], false);
        assert!(report.json["errors"][0]
            .as_str()
            .unwrap()
            .starts_with("Failed to load"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "logging:\n  level: debug\n");

        let report = validate_report(&path);
        assert_eq!(report.json["valid"], true);
        assert!(matches!(report.lines[0], Line::Heading(_)));
    }

    #[tokio::test]
    async fn test_show_defaults_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let ctx = CliContext {
            format: OutputFormat::Human,
            config: Config::default(),
            config_path: dir.path().join("absent.yaml"),
        };

        let report = show_report(&ctx).unwrap();
        assert_eq!(report.json["backup"]["upload_limit_threshold"], 10);
        assert_eq!(
            report.lines[1],
            Line::Detail("(file not found, showing defaults)".to_string())
        );
        ConfigCommand::Show.execute(&ctx).await.unwrap();
    }
}
