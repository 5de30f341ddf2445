//! Rendering of journal responses.
//!
//! Renderers return strings so commands decide where they go; only the
//! status lines print directly.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    Json,
    Yaml,
}

/// Serialize a response for scripts. `Table` falls back to JSON for
/// responses that have no tabular form.
pub fn document<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table | OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?.trim_end().to_string(),
    })
}

/// A stream's events, oldest first, with the version column right-aligned.
pub fn events_table<T: Tabled>(stream: &str, rows: &[T]) -> String {
    if rows.is_empty() {
        return format!("Stream {} has no events", stream).dimmed().to_string();
    }
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::right()))
        .to_string();
    let noun = if rows.len() == 1 { "event" } else { "events" };
    format!("{}\n{} {} in {}", table, rows.len(), noun, stream.bold())
}

/// Health summary: the reported status, then whichever fields were present.
pub fn health_report(status: &str, fields: &[(&str, Option<&str>)]) -> String {
    let mut lines = vec![format!("Journal {}", status).bold().to_string()];
    for (key, value) in fields {
        if let Some(value) = value {
            lines.push(format!("  {}: {}", key.cyan(), value));
        }
    }
    lines.join("\n")
}

pub fn print_ok(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}
