//! Bounded suspension history and statistics

use super::AISuspension;
use crate::models::{ShutdownStrategy, SuspensionReason, SuspensionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// One recorded suspension state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ai_module_id: String,
    pub timestamp: DateTime<Utc>,
    pub old_state: SuspensionState,
    pub new_state: SuspensionState,
    pub reason: SuspensionReason,
    pub strategy: ShutdownStrategy,
}

impl HistoryEntry {
    /// ACTIVE to SUSPENDED
    pub fn is_suspension(&self) -> bool {
        self.old_state == SuspensionState::Active && self.new_state == SuspensionState::Suspended
    }
}

/// Aggregate view over history and current records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionStats {
    /// Suspensions still present in retained history
    pub total_suspensions: usize,
    pub active_modules: usize,
    pub suspended_modules: usize,
    /// Over currently suspended modules only
    pub suspension_reasons: BTreeMap<SuspensionReason, usize>,
    /// Over currently suspended modules only
    pub suspension_strategies: BTreeMap<ShutdownStrategy, usize>,
}

impl SuspensionStats {
    pub(crate) fn compute<'a>(
        history: &SuspensionHistory,
        records: impl IntoIterator<Item = &'a AISuspension>,
    ) -> Self {
        let mut stats = SuspensionStats {
            total_suspensions: history.entries.iter().filter(|e| e.is_suspension()).count(),
            ..Default::default()
        };

        for record in records {
            if !record.is_suspended() {
                stats.active_modules += 1;
                continue;
            }
            stats.suspended_modules += 1;
            if let Some(reason) = record.reason {
                *stats.suspension_reasons.entry(reason).or_insert(0) += 1;
            }
            if let Some(strategy) = record.strategy {
                *stats.suspension_strategies.entry(strategy).or_insert(0) += 1;
            }
        }

        stats
    }
}

/// Append-only log that drops its oldest entries past `max_entries`
pub(crate) struct SuspensionHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
}

impl SuspensionHistory {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub(crate) fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent first, optionally restricted to one module
    pub(crate) fn recent(&self, ai_module_id: Option<&str>, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| ai_module_id.map_or(true, |id| e.ai_module_id == id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
