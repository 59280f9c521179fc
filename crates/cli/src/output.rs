//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format MiB as a human-readable string
pub fn format_mb(mb: u64) -> String {
    if mb >= 1024 {
        format!("{:.1}Gi", mb as f64 / 1024.0)
    } else {
        format!("{}Mi", mb)
    }
}

/// `used / total (pct%)`
pub fn format_usage(used: &str, total: &str, pct: f64) -> String {
    format!("{} / {} ({:.0}%)", used, total, pct)
}

/// Utilisation percentage; a zero total reads as 0%
pub fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        used / total * 100.0
    } else {
        0.0
    }
}

/// Color a predicted class by severity
pub fn color_class(class: u32) -> String {
    let label = class.to_string();
    match class {
        0 => label.green().to_string(),
        1 | 2 => label.yellow().to_string(),
        _ => label.red().to_string(),
    }
}

/// Color a utilisation percentage
pub fn color_pct(value: String, pct: f64) -> String {
    if pct >= 90.0 {
        value.red().to_string()
    } else if pct >= 75.0 {
        value.yellow().to_string()
    } else {
        value
    }
}
