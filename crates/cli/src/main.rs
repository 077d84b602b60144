//! govctl - inspect a running module governor
//!
//! Read-only views over the governor's lifecycle registry, resource
//! monitor, suspension manager and shutdown history.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{modules, status, suspensions};
use governor_lib::{ModuleState, SuspensionState};

/// Module governor CLI
#[derive(Parser)]
#[command(name = "govctl")]
#[command(author, version, about = "CLI for the Module Governor", long_about = None)]
pub struct Cli {
    /// Governor API URL (can also be set via GOVCTL_API_URL env var)
    #[arg(long, env = "GOVCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show service health and readiness
    Status,

    /// Inspect lifecycle modules
    #[command(subcommand)]
    Modules(ModulesCommands),

    /// Inspect AI module resource usage
    #[command(subcommand)]
    AiModules(AiModulesCommands),

    /// Inspect suspensions
    #[command(subcommand)]
    Suspensions(SuspensionsCommands),

    /// Show recent lifecycle actions taken by the shutdown executor
    Shutdowns {
        /// Maximum number of records
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum ModulesCommands {
    /// List registered modules
    List {
        /// Filter by state (stopped, running, paused)
        #[arg(long, value_parser = parse_module_state)]
        state: Option<ModuleState>,

        /// Only modules with priority at least this value
        #[arg(long)]
        min_priority: Option<i32>,

        /// Only modules with priority at most this value
        #[arg(long)]
        max_priority: Option<i32>,
    },

    /// Show a single module
    Get {
        /// Module ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AiModulesCommands {
    /// List tracked AI modules with usage and alert levels
    List,

    /// Show usage, limits and alert levels for one AI module
    Get {
        /// AI module ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SuspensionsCommands {
    /// List suspension records
    List {
        /// Filter by state (active, suspended)
        #[arg(long, value_parser = parse_suspension_state)]
        state: Option<SuspensionState>,
    },

    /// Show suspension history, newest first
    History {
        /// Maximum number of entries
        #[arg(long, short, default_value_t = 20)]
        limit: usize,

        /// Only entries for this AI module
        #[arg(long, short)]
        module: Option<String>,
    },

    /// Show suspension statistics
    Stats,

    /// Show pending scheduled suspensions
    Scheduled,
}

fn parse_module_state(value: &str) -> Result<ModuleState, String> {
    match value.to_lowercase().as_str() {
        "stopped" => Ok(ModuleState::Stopped),
        "running" => Ok(ModuleState::Running),
        "paused" => Ok(ModuleState::Paused),
        other => Err(format!("unknown module state '{other}'")),
    }
}

fn parse_suspension_state(value: &str) -> Result<SuspensionState, String> {
    match value.to_lowercase().as_str() {
        "active" => Ok(SuspensionState::Active),
        "suspended" => Ok(SuspensionState::Suspended),
        other => Err(format!("unknown suspension state '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
        Commands::Modules(modules_cmd) => match modules_cmd {
            ModulesCommands::List {
                state,
                min_priority,
                max_priority,
            } => {
                modules::list_modules(&client, state, min_priority, max_priority, cli.format).await?;
            }
            ModulesCommands::Get { id } => {
                modules::get_module(&client, &id, cli.format).await?;
            }
        },
        Commands::AiModules(ai_cmd) => match ai_cmd {
            AiModulesCommands::List => {
                modules::list_ai_modules(&client, cli.format).await?;
            }
            AiModulesCommands::Get { id } => {
                modules::get_ai_module(&client, &id, cli.format).await?;
            }
        },
        Commands::Suspensions(suspensions_cmd) => match suspensions_cmd {
            SuspensionsCommands::List { state } => {
                suspensions::list_suspensions(&client, state, cli.format).await?;
            }
            SuspensionsCommands::History { limit, module } => {
                suspensions::show_history(&client, limit, module, cli.format).await?;
            }
            SuspensionsCommands::Stats => {
                suspensions::show_stats(&client, cli.format).await?;
            }
            SuspensionsCommands::Scheduled => {
                suspensions::show_scheduled(&client, cli.format).await?;
            }
        },
        Commands::Shutdowns { limit } => {
            status::show_shutdowns(&client, limit, cli.format).await?;
        }
    }

    Ok(())
}
