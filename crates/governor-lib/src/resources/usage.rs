//! Per-module resource ledger entry

use super::{AlertLevel, ResourceAlert, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource usage, limits and last observed alert levels for one AI module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIResourceUsage {
    pub ai_module_id: String,
    pub name: String,
    pub resources: BTreeMap<ResourceKind, f64>,
    /// Absent kinds are unlimited
    pub limits: BTreeMap<ResourceKind, f64>,
    pub last_alert_level: BTreeMap<ResourceKind, AlertLevel>,
    pub last_updated: DateTime<Utc>,
}

impl AIResourceUsage {
    pub fn new(
        ai_module_id: impl Into<String>,
        name: impl Into<String>,
        limits: BTreeMap<ResourceKind, f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ai_module_id: ai_module_id.into(),
            name: name.into(),
            resources: BTreeMap::new(),
            limits,
            last_alert_level: BTreeMap::new(),
            last_updated: now,
        }
    }

    pub fn value(&self, kind: &ResourceKind) -> f64 {
        self.resources.get(kind).copied().unwrap_or(0.0)
    }

    pub fn level(&self, kind: &ResourceKind) -> AlertLevel {
        self.last_alert_level.get(kind).copied().unwrap_or_default()
    }

    /// Highest level across all limited resources
    pub fn worst_level(&self) -> AlertLevel {
        self.last_alert_level
            .values()
            .copied()
            .max()
            .unwrap_or_default()
    }

    pub(crate) fn add(&mut self, kind: ResourceKind, amount: f64) {
        *self.resources.entry(kind).or_insert(0.0) += amount;
    }

    /// Recompute levels for every limited resource and return the upward
    /// transitions. Downward moves are recorded silently.
    pub(crate) fn evaluate(&mut self, threshold: f64) -> Vec<ResourceAlert> {
        let mut alerts = Vec::new();

        // Levels for resources that lost their limit fall back to normal.
        let limits = &self.limits;
        self.last_alert_level.retain(|kind, _| limits.contains_key(kind));

        for (kind, &limit) in &self.limits {
            let value = self.resources.get(kind).copied().unwrap_or(0.0);
            let level = AlertLevel::classify(value, limit, threshold);
            let previous = self
                .last_alert_level
                .insert(kind.clone(), level)
                .unwrap_or_default();

            if level > previous {
                alerts.push(ResourceAlert {
                    ai_module_id: self.ai_module_id.clone(),
                    resource: kind.clone(),
                    level,
                    previous,
                    value,
                    limit,
                });
            }
        }

        alerts
    }
}
