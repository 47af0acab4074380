//! Rendering of command results
//!
//! A command builds one [`Report`] holding both renderings of its result:
//! the JSON document and the lines a person reads. [`Output`] prints the
//! one selected by `--json`, so scripts get exactly one document per
//! command on stdout.

use mediabackup_core::domain::{
    newtypes::UserId, BackupCounts, BackupError, BackupState, BackupStatus,
};
use serde_json::{json, Value};

use crate::commands::format_time;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// One line of human output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Prefixed with a check mark
    Heading(String),
    /// Indented under the previous heading
    Detail(String),
    /// Printed on stderr
    Problem(String),
    Blank,
}

/// A command result in both renderings
#[derive(Debug, Default)]
pub struct Report {
    pub json: Value,
    pub lines: Vec<Line>,
}

impl Report {
    pub fn new(json: Value) -> Self {
        Self {
            json,
            lines: Vec::new(),
        }
    }

    pub fn heading(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(Line::Heading(text.into()));
        self
    }

    pub fn detail(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(Line::Detail(text.into()));
        self
    }

    pub fn problem(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(Line::Problem(text.into()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(Line::Blank);
        self
    }
}

/// Prints reports in the selected format
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print(&self, report: &Report) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report.json).unwrap_or_default()
                );
            }
            OutputFormat::Human => {
                for line in &report.lines {
                    match line {
                        Line::Heading(text) => println!("\u{2713} {text}"),
                        Line::Detail(text) => println!("  {text}"),
                        Line::Problem(text) => eprintln!("\u{2717} {text}"),
                        Line::Blank => println!(),
                    }
                }
            }
        }
    }

    /// Reports a condition that keeps the command from running
    pub fn problem(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", json!({"success": false, "error": message}));
            }
            OutputFormat::Human => eprintln!("\u{2717} Error: {message}"),
        }
    }
}

// ============================================================================
// Backup states and errors
// ============================================================================

pub fn counts_line(counts: &BackupCounts) -> String {
    format!(
        "total {}  pending {}  preparing {}  failed {}  complete {}",
        counts.total, counts.pending, counts.preparing, counts.failed, counts.complete
    )
}

/// Human lines for the aggregated state of one folder
pub fn state_lines(state: &BackupState) -> Vec<Line> {
    match state {
        BackupState::Disabled { has_default_bucket } => {
            let hint = if *has_default_bucket {
                "a default bucket is configured"
            } else {
                "no default bucket configured"
            };
            vec![Line::Detail(format!("Backup disabled ({hint})"))]
        }
        BackupState::Enabled {
            folder_id,
            bucket_id,
            network_type,
            status,
        } => {
            let mut lines = vec![
                Line::Detail(format!(
                    "{folder_id} (bucket {bucket_id}, {network_type}): {}",
                    status.name()
                )),
                Line::Detail(format!("  {}", counts_line(status.counts()))),
            ];
            if let BackupStatus::Failed { errors, .. } = status {
                lines.extend(errors.iter().map(|e| Line::Detail(format!("  ! {e}"))));
            }
            lines
        }
    }
}

pub fn error_json(user_id: &UserId, error: &BackupError) -> Value {
    json!({
        "user": user_id.as_str(),
        "folder": error.folder_id.as_str(),
        "type": error.error_type.as_str(),
        "category": error.error_type.category(),
        "retryable": error.error_type.is_retryable(),
        "message": error.message,
        "created_at": error.created_at.to_rfc3339(),
    })
}

/// Human lines for a persisted error: a summary and its message, if any
pub fn error_lines(user_id: &UserId, error: &BackupError) -> Vec<Line> {
    let retry = if error.error_type.is_retryable() {
        "retryable"
    } else {
        "permanent"
    };
    let mut lines = vec![Line::Detail(format!(
        "{user_id}/{} - {} ({retry}) since {}",
        error.folder_id,
        error.error_type,
        format_time(Some(error.created_at), "")
    ))];
    if let Some(message) = &error.message {
        lines.push(Line::Detail(format!("    {message}")));
    }
    lines
}
