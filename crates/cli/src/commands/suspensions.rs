//! Suspension commands

use anyhow::Result;
use colored::Colorize;
use governor_lib::{AISuspension, HistoryEntry, ScheduledSuspension, SuspensionState, SuspensionStats};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_map, format_optional, format_timestamp, print_json, print_table,
    OutputFormat,
};

#[derive(Tabled)]
struct SuspensionRow {
    #[tabled(rename = "AI Module")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Suspended At")]
    suspended_at: String,
    #[tabled(rename = "Resume At")]
    resume_at: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "AI Module")]
    id: String,
    #[tabled(rename = "Transition")]
    transition: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
}

#[derive(Tabled)]
struct ScheduledRow {
    #[tabled(rename = "AI Module")]
    id: String,
    #[tabled(rename = "Suspend At")]
    suspend_at: String,
    #[tabled(rename = "Resume At")]
    resume_at: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
}

/// List suspension records
pub async fn list_suspensions(
    client: &ApiClient,
    state: Option<SuspensionState>,
    format: OutputFormat,
) -> Result<()> {
    let records: Vec<AISuspension> = client
        .get_with_query(
            "api/v1/suspensions",
            &[("state", state.map(|s| s.to_string()))],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            let rows: Vec<SuspensionRow> = records
                .iter()
                .map(|r| SuspensionRow {
                    id: r.ai_module_id.clone(),
                    name: r.name.clone(),
                    state: color_status(&r.state.to_string()),
                    reason: format_optional(r.reason),
                    strategy: format_optional(r.strategy),
                    suspended_at: format_optional(r.suspended_at.as_ref().map(format_timestamp)),
                    resume_at: format_optional(r.resume_at.as_ref().map(format_timestamp)),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Show suspension history, newest first
pub async fn show_history(
    client: &ApiClient,
    limit: usize,
    module: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let entries: Vec<HistoryEntry> = client
        .get_with_query(
            "api/v1/suspensions/history",
            &[("limit", Some(limit.to_string())), ("ai_module_id", module)],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Table => {
            let rows: Vec<HistoryRow> = entries.iter().map(history_row).collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Show suspension statistics
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: SuspensionStats = client.get("api/v1/suspensions/stats").await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!("{}", "Suspension Statistics".bold());
            println!("{}", "=".repeat(50));
            println!("Total suspensions:      {}", stats.total_suspensions);
            println!(
                "Active modules:         {}",
                stats.active_modules.to_string().green()
            );
            println!(
                "Suspended modules:      {}",
                stats.suspended_modules.to_string().yellow()
            );
            println!();
            println!("By reason:              {}", format_map(&stats.suspension_reasons));
            println!(
                "By strategy:            {}",
                format_map(&stats.suspension_strategies)
            );
        }
    }

    Ok(())
}

/// Show pending scheduled suspensions
pub async fn show_scheduled(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let scheduled: Vec<ScheduledSuspension> = client.get("api/v1/suspensions/scheduled").await?;

    match format {
        OutputFormat::Json => print_json(&scheduled)?,
        OutputFormat::Table => {
            let rows: Vec<ScheduledRow> = scheduled
                .iter()
                .map(|s| ScheduledRow {
                    id: s.ai_module_id.clone(),
                    suspend_at: format_timestamp(&s.suspend_at),
                    resume_at: format_timestamp(&s.resume_at),
                    reason: s.reason.to_string(),
                    strategy: s.strategy.to_string(),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

fn history_row(entry: &HistoryEntry) -> HistoryRow {
    HistoryRow {
        time: format_timestamp(&entry.timestamp),
        id: entry.ai_module_id.clone(),
        transition: format!("{} -> {}", entry.old_state, entry.new_state),
        reason: entry.reason.to_string(),
        strategy: entry.strategy.to_string(),
    }
}
