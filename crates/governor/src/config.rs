//! Governor service configuration
//!
//! Read from an optional TOML file named by `GOVERNOR_CONFIG`, then from
//! `GOVERNOR_*` environment variables, which take precedence.

use anyhow::{bail, Context, Result};
use governor_lib::{GovernorBuilder, ModuleInfo, ResourceKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "GOVERNOR_CONFIG";
const ENV_PREFIX: &str = "GOVERNOR";

#[derive(Debug, Clone, Deserialize)]
pub struct GovernorConfig {
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for health, metrics and status endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,

    /// Fraction of a limit at which a resource enters WARNING
    #[serde(default = "default_notification_threshold")]
    pub notification_threshold: f64,

    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Suspend AI modules when a resource goes CRITICAL
    #[serde(default = "default_auto_suspend")]
    pub auto_suspend: bool,

    /// Limits for AI modules that declare none
    #[serde(default)]
    pub default_limits: BTreeMap<ResourceKind, f64>,

    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    #[serde(default)]
    pub ai_modules: Vec<AiModuleConfig>,
}

/// Lifecycle module declared in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: i32,
    #[serde(default)]
    pub autostart: bool,
}

impl ModuleConfig {
    pub fn to_info(&self) -> ModuleInfo {
        ModuleInfo::new(&self.id, &self.name, self.priority).with_description(&self.description)
    }
}

/// AI module declared in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiModuleConfig {
    pub id: String,
    pub name: String,
    pub limits: Option<BTreeMap<ResourceKind, f64>>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_scheduler_interval() -> u64 {
    10
}

fn default_notification_threshold() -> f64 {
    0.8
}

fn default_max_history() -> usize {
    10_000
}

fn default_auto_suspend() -> bool {
    true
}

impl GovernorConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to read governor configuration")?;

        Self::from_config(config)
    }

    /// Parse a TOML document, ignoring the environment
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .context("failed to parse governor configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("invalid governor configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor_interval_secs == 0 || self.scheduler_interval_secs == 0 {
            bail!("loop intervals must be at least one second");
        }

        let mut seen = std::collections::HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.id.as_str()) {
                bail!("module '{}' is declared twice", module.id);
            }
        }
        seen.clear();
        for module in &self.ai_modules {
            if !seen.insert(module.id.as_str()) {
                bail!("AI module '{}' is declared twice", module.id);
            }
        }
        Ok(())
    }

    /// Library builder preloaded with these settings
    pub fn governor_builder(&self) -> GovernorBuilder {
        governor_lib::Governor::builder()
            .node_name(&self.node_name)
            .monitor_interval(Duration::from_secs(self.monitor_interval_secs))
            .scheduler_interval(Duration::from_secs(self.scheduler_interval_secs))
            .notification_threshold(self.notification_threshold)
            .max_history(self.max_history)
            .default_limits(self.default_limits.clone())
            .auto_suspend(self.auto_suspend)
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            monitor_interval_secs: default_monitor_interval(),
            scheduler_interval_secs: default_scheduler_interval(),
            notification_threshold: default_notification_threshold(),
            max_history: default_max_history(),
            auto_suspend: default_auto_suspend(),
            default_limits: BTreeMap::new(),
            modules: Vec::new(),
            ai_modules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = GovernorConfig::from_toml("").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.monitor_interval_secs, 5);
        assert_eq!(config.scheduler_interval_secs, 10);
        assert_eq!(config.max_history, 10_000);
        assert!(config.auto_suspend);
        assert!(config.default_limits.is_empty());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_declared_modules() {
        let config = GovernorConfig::from_toml(
            r#"
            node_name = "edge-1"
            api_port = 9100
            notification_threshold = 0.75

            [default_limits]
            cpu = 90.0

            [[modules]]
            id = "indexer"
            name = "Indexer"
            priority = 2
            autostart = true

            [[modules]]
            id = "reporting"
            name = "Reporting"
            description = "Nightly reports"
            priority = 1

            [[ai_modules]]
            id = "llm"
            name = "LLM"
            limits = { gpu = 90.0, tokens = 100000.0 }
            "#,
        )
        .unwrap();

        assert_eq!(config.node_name, "edge-1");
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.default_limits[&ResourceKind::Cpu], 90.0);
        assert_eq!(config.modules.len(), 2);
        assert!(config.modules[0].autostart);
        assert!(!config.modules[1].autostart);
        assert_eq!(config.modules[1].to_info().description, "Nightly reports");

        let limits = config.ai_modules[0].limits.as_ref().unwrap();
        assert_eq!(limits[&ResourceKind::Gpu], 90.0);
        assert_eq!(limits[&ResourceKind::Tokens], 100000.0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = GovernorConfig::from_toml(
            r#"
            [[modules]]
            id = "a"
            name = "A"
            priority = 1

            [[modules]]
            id = "a"
            name = "A again"
            priority = 2
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("declared twice"));
    }

    #[test]
    fn test_builder_carries_settings() {
        let config = GovernorConfig {
            notification_threshold: 2.0,
            ..Default::default()
        };
        assert!(config.governor_builder().build().is_err());
        assert!(GovernorConfig::default().governor_builder().build().is_ok());
    }
}
