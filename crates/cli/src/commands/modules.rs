//! Lifecycle module and AI module resource commands

use anyhow::Result;
use colored::Colorize;
use governor_lib::{AIResourceUsage, AlertLevel, ModuleInfo, ModuleState, ResourceKind};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_map, format_timestamp, print_info, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Priority")]
    priority: i32,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Tabled)]
struct AiModuleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Highest Alert")]
    alert: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Limit")]
    limit: String,
    #[tabled(rename = "Alert")]
    alert: String,
}

/// List registered modules, optionally filtered
pub async fn list_modules(
    client: &ApiClient,
    state: Option<ModuleState>,
    min_priority: Option<i32>,
    max_priority: Option<i32>,
    format: OutputFormat,
) -> Result<()> {
    let modules: Vec<ModuleInfo> = client
        .get_with_query(
            "api/v1/modules",
            &[
                ("state", state.map(|s| s.to_string())),
                ("min_priority", min_priority.map(|p| p.to_string())),
                ("max_priority", max_priority.map(|p| p.to_string())),
            ],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&modules)?,
        OutputFormat::Table => {
            let rows: Vec<ModuleRow> = modules
                .into_iter()
                .map(|m| ModuleRow {
                    state: color_status(&m.state.to_string()),
                    id: m.module_id,
                    name: m.name,
                    priority: m.priority,
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Show a single module
pub async fn get_module(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let module: ModuleInfo = client.get(&format!("api/v1/modules/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&module)?,
        OutputFormat::Table => {
            println!("{}", "Module".bold());
            println!("{}", "=".repeat(50));
            println!("ID:                     {}", module.module_id.cyan());
            println!("Name:                   {}", module.name);
            if !module.description.is_empty() {
                println!("Description:            {}", module.description);
            }
            println!("Priority:               {}", module.priority);
            println!(
                "State:                  {}",
                color_status(&module.state.to_string())
            );
        }
    }

    Ok(())
}

/// List AI modules with their current usage
pub async fn list_ai_modules(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let modules: Vec<AIResourceUsage> = client.get("api/v1/ai-modules").await?;

    match format {
        OutputFormat::Json => print_json(&modules)?,
        OutputFormat::Table => {
            let rows: Vec<AiModuleRow> = modules
                .iter()
                .map(|m| AiModuleRow {
                    id: m.ai_module_id.clone(),
                    name: m.name.clone(),
                    usage: format_map(&m.resources),
                    alert: color_status(highest_alert(m).as_str()),
                    updated: format_timestamp(&m.last_updated),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Show per-resource usage, limits and alert levels for one AI module
pub async fn get_ai_module(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let usage: AIResourceUsage = client.get(&format!("api/v1/ai-modules/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&usage)?,
        OutputFormat::Table => {
            println!("{}", "AI Module".bold());
            println!("{}", "=".repeat(50));
            println!("ID:                     {}", usage.ai_module_id.cyan());
            println!("Name:                   {}", usage.name);
            println!(
                "Last updated:           {}",
                format_timestamp(&usage.last_updated).dimmed()
            );
            println!();

            let rows = resource_rows(&usage);
            if rows.is_empty() {
                print_info("No resources reported yet");
            } else {
                print_table(&rows);
            }
        }
    }

    Ok(())
}

fn highest_alert(usage: &AIResourceUsage) -> AlertLevel {
    usage
        .last_alert_level
        .values()
        .copied()
        .max()
        .unwrap_or_default()
}

/// One row per resource that has a value or a limit
fn resource_rows(usage: &AIResourceUsage) -> Vec<ResourceRow> {
    let mut kinds: Vec<&ResourceKind> = usage.resources.keys().chain(usage.limits.keys()).collect();
    kinds.sort();
    kinds.dedup();

    kinds
        .into_iter()
        .map(|kind| ResourceRow {
            resource: kind.to_string(),
            value: usage
                .resources
                .get(kind)
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
            limit: usage
                .limits
                .get(kind)
                .map_or_else(|| "unlimited".to_string(), |l| l.to_string()),
            alert: color_status(
                usage
                    .last_alert_level
                    .get(kind)
                    .copied()
                    .unwrap_or_default()
                    .as_str(),
            ),
        })
        .collect()
}
