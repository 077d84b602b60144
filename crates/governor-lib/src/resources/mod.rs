//! Resource accounting for AI-workload modules
//!
//! This module provides:
//! - A per-module ledger of gauges (cpu, memory, gpu, ...) and counters (tokens, api calls)
//! - Alert level classification against configured limits
//! - Edge-triggered alert callbacks and an optional background sampling loop

mod monitor;
mod usage;

pub use monitor::{AlertCallback, PollSummary, ResourceMonitor, ResourceMonitorConfig};
pub use usage::AIResourceUsage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Default fraction of a limit at which a resource enters WARNING
pub const DEFAULT_NOTIFICATION_THRESHOLD: f64 = 0.8;

/// Kind of resource tracked for an AI module
///
/// Unknown names are kept as [`ResourceKind::Custom`] so newer samplers can
/// report dimensions this build does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    /// Percent
    Cpu,
    /// Percent
    Memory,
    /// Percent
    Gpu,
    /// Accumulating counter
    Tokens,
    /// Accumulating counter
    ApiCalls,
    Storage,
    Network,
    Custom(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Gpu => "gpu",
            ResourceKind::Tokens => "tokens",
            ResourceKind::ApiCalls => "api_calls",
            ResourceKind::Storage => "storage",
            ResourceKind::Network => "network",
            ResourceKind::Custom(name) => name,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "cpu" => ResourceKind::Cpu,
            "memory" => ResourceKind::Memory,
            "gpu" => ResourceKind::Gpu,
            "tokens" => ResourceKind::Tokens,
            "api_calls" => ResourceKind::ApiCalls,
            "storage" => ResourceKind::Storage,
            "network" => ResourceKind::Network,
            _ => ResourceKind::Custom(name.to_string()),
        }
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        ResourceKind::from(name.as_str())
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a resource relative to its limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }

    /// Classify `value` against `limit`.
    ///
    /// NORMAL below `threshold * limit`, WARNING from there up to the limit,
    /// CRITICAL at or above the limit.
    pub fn classify(value: f64, limit: f64, threshold: f64) -> Self {
        if value >= limit {
            AlertLevel::Critical
        } else if value >= limit * threshold {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upward alert level transition for one resource of one AI module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAlert {
    pub ai_module_id: String,
    pub resource: ResourceKind,
    pub level: AlertLevel,
    pub previous: AlertLevel,
    pub value: f64,
    pub limit: f64,
}

/// Read access to current resource values, keyed by module id
pub trait ResourceLedger {
    fn resource_value(&self, module_id: &str, kind: &ResourceKind) -> Option<f64>;
}

/// External metrics source polled by the monitor's background loop
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Current gauge values for one AI module
    async fn sample(&self, ai_module_id: &str) -> anyhow::Result<HashMap<ResourceKind, f64>>;
}
