//! Selection of modules to act on when resources run short
//!
//! Every selector returns module ids ordered from least to most critical so
//! callers can act on a prefix. Selection never mutates the registry.

use super::ModuleRegistry;
use crate::models::{ModuleInfo, ModuleState, ShutdownReason};
use crate::resources::{ResourceKind, ResourceLedger};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct PriorityDeterminer {
    registry: Arc<ModuleRegistry>,
}

impl PriorityDeterminer {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// Running modules sorted by (priority, id) ascending
    fn running_by_priority(&self) -> Vec<ModuleInfo> {
        let mut running = self.registry.by_state(ModuleState::Running);
        running.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.module_id.cmp(&b.module_id))
        });
        running
    }

    /// The `count` running modules with the lowest priority
    pub fn by_count(&self, count: usize, reason: ShutdownReason) -> Vec<String> {
        let selected: Vec<String> = self
            .running_by_priority()
            .into_iter()
            .take(count)
            .map(|m| m.module_id)
            .collect();

        debug!(reason = %reason, count = count, selected = ?selected, "Selected modules by count");
        selected
    }

    /// All running modules with `priority <= max_priority`
    pub fn by_priority_ceiling(&self, max_priority: i32, reason: ShutdownReason) -> Vec<String> {
        let selected: Vec<String> = self
            .running_by_priority()
            .into_iter()
            .filter(|m| m.priority <= max_priority)
            .map(|m| m.module_id)
            .collect();

        debug!(
            reason = %reason,
            max_priority = max_priority,
            selected = ?selected,
            "Selected modules by priority ceiling"
        );
        selected
    }

    /// All running modules whose ledger value for `kind` exceeds `threshold`.
    /// Priority is ignored; ids are returned in ascending order.
    pub fn by_resource_threshold(
        &self,
        kind: &ResourceKind,
        threshold: f64,
        reason: ShutdownReason,
        ledger: &dyn ResourceLedger,
    ) -> Vec<String> {
        let selected: Vec<String> = self
            .registry
            .by_state(ModuleState::Running)
            .into_iter()
            .filter(|m| {
                ledger
                    .resource_value(&m.module_id, kind)
                    .map_or(false, |value| value > threshold)
            })
            .map(|m| m.module_id)
            .collect();

        debug!(
            reason = %reason,
            resource = %kind,
            threshold = threshold,
            selected = ?selected,
            "Selected modules by resource threshold"
        );
        selected
    }
}
