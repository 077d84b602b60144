//! Suspension bookkeeping for AI modules
//!
//! This module provides:
//! - Per-AI-module ACTIVE/SUSPENDED state, delegated to the shutdown executor
//! - Time-based suspension windows and auto-resume
//! - An append-only transition history and aggregate statistics
//! - Wiring from CRITICAL resource alerts to automatic suspension

mod history;
mod manager;
mod scheduler;

#[cfg(test)]
mod tests;

pub use history::{HistoryEntry, SuspensionStats};
pub use manager::{SuspensionCallback, SuspensionManager};
pub use scheduler::{ScheduledSuspension, SchedulerCommand, TickSummary};

use crate::models::{ShutdownStrategy, SuspensionReason, SuspensionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of history entries retained
pub const DEFAULT_MAX_HISTORY: usize = 10_000;

/// Configuration for the suspension manager
#[derive(Debug, Clone)]
pub struct SuspensionConfig {
    /// How often due schedules and auto-resumes are checked (default: 10 seconds)
    pub check_interval: Duration,
    pub max_history: usize,
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Current suspension record of one AI module
///
/// `reason`, `strategy`, `suspended_at` and `resume_at` are only set while
/// the module is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AISuspension {
    pub ai_module_id: String,
    pub name: String,
    pub state: SuspensionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuspensionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ShutdownStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    /// Set when this suspension paused the lifecycle module of the same id,
    /// so only that pause is undone on resume
    #[serde(default)]
    pub paused_module: bool,
}

impl AISuspension {
    pub fn new(ai_module_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ai_module_id: ai_module_id.into(),
            name: name.into(),
            state: SuspensionState::Active,
            reason: None,
            strategy: None,
            suspended_at: None,
            resume_at: None,
            paused_module: false,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.state == SuspensionState::Suspended
    }

    /// True if an auto-resume is pending and `now` has reached it
    pub fn resume_due(&self, now: DateTime<Utc>) -> bool {
        self.is_suspended() && self.resume_at.map_or(false, |at| at <= now)
    }
}
