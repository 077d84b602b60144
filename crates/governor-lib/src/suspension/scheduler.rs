//! Scheduled suspension queue and the commands one loop tick produces

use crate::models::{ShutdownStrategy, SuspensionReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A suspension window queued for later execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSuspension {
    pub ai_module_id: String,
    pub suspend_at: DateTime<Utc>,
    pub resume_at: DateTime<Utc>,
    pub reason: SuspensionReason,
    pub strategy: ShutdownStrategy,
}

/// Work item computed by one scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerCommand {
    /// Suspend now and resume at the entry's `resume_at`
    ExecuteScheduled(ScheduledSuspension),
    AutoResume { ai_module_id: String },
}

impl SchedulerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerCommand::ExecuteScheduled(_) => "execute_scheduled",
            SchedulerCommand::AutoResume { .. } => "auto_resume",
        }
    }

    pub fn ai_module_id(&self) -> &str {
        match self {
            SchedulerCommand::ExecuteScheduled(entry) => &entry.ai_module_id,
            SchedulerCommand::AutoResume { ai_module_id } => ai_module_id,
        }
    }
}

/// Outcome counts of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub executed: usize,
    pub resumed: usize,
    pub failures: usize,
}

/// FIFO of pending windows. Entries for the same module may overlap.
#[derive(Default)]
pub(crate) struct ScheduleQueue {
    entries: Vec<ScheduledSuspension>,
}

impl ScheduleQueue {
    pub(crate) fn push(&mut self, entry: ScheduledSuspension) {
        self.entries.push(entry);
    }

    /// Remove and return every entry with `suspend_at <= now`, in queue order
    pub(crate) fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledSuspension> {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.suspend_at <= now);
        self.entries = pending;
        due
    }

    pub(crate) fn for_module(&self, ai_module_id: &str) -> Vec<ScheduledSuspension> {
        self.entries
            .iter()
            .filter(|e| e.ai_module_id == ai_module_id)
            .cloned()
            .collect()
    }

    pub(crate) fn all(&self) -> Vec<ScheduledSuspension> {
        self.entries.clone()
    }

    /// Drop every entry for a module, returning how many were removed
    pub(crate) fn cancel(&mut self, ai_module_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.ai_module_id != ai_module_id);
        before - self.entries.len()
    }
}
