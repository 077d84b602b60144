//! Service health and shutdown history commands

use anyhow::Result;
use colored::Colorize;
use governor_lib::{HealthResponse, ReadinessResponse, ShutdownRecord};
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_optional, format_timestamp, print_json, print_table, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct ShutdownRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Serialize)]
struct StatusView {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Show component health and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.probe("healthz").await?;
    let readiness: ReadinessResponse = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&StatusView { health, readiness })?,
        OutputFormat::Table => {
            println!("{}", "Governor Status".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Health:                 {}",
                color_status(health.status.as_str())
            );
            let ready = if readiness.ready {
                "yes".green()
            } else {
                "no".red()
            };
            println!("Ready:                  {}", ready);
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    component: name.clone(),
                    status: color_status(component.status.as_str()),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Show recent shutdown executor actions, newest first
pub async fn show_shutdowns(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let records: Vec<ShutdownRecord> = client
        .get_with_query("api/v1/shutdowns", &[("limit", Some(limit.to_string()))])
        .await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            let rows: Vec<ShutdownRow> = records
                .iter()
                .map(|r| ShutdownRow {
                    time: format_timestamp(&r.timestamp),
                    module: r.module_id.clone(),
                    action: r.action.to_string(),
                    strategy: format_optional(r.strategy),
                    reason: format_optional(r.reason),
                    result: match &r.error {
                        Some(e) => format!("{} ({})", color_status("failed"), e),
                        None if r.success => color_status("ok"),
                        None => color_status("failed"),
                    },
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}
