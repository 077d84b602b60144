//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print table rows, or a notice when there are none
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a timestamp for display
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_optional<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Render a map as `key=value` pairs
pub fn format_map<K: Display, V: Display>(map: &BTreeMap<K, V>) -> String {
    if map.is_empty() {
        return "-".to_string();
    }
    map.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "running" | "active" | "normal" | "ok" => status.green().to_string(),
        "degraded" | "paused" | "warning" | "suspended" => status.yellow().to_string(),
        "unhealthy" | "critical" | "failed" => status.red().to_string(),
        "stopped" => status.dimmed().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_map() {
        let map = BTreeMap::from([("cpu", 50.0), ("gpu", 95.5)]);
        assert_eq!(format_map(&map), "cpu=50, gpu=95.5");
        assert_eq!(format_map(&BTreeMap::<String, f64>::new()), "-");
    }

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(Some("manual")), "manual");
        assert_eq!(format_optional(None::<&str>), "-");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2026-03-01 12:30:00 UTC");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("suspended"), "suspended");
        assert_eq!(color_status("custom"), "custom");
    }
}
