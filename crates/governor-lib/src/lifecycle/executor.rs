//! Shutdown executor
//!
//! Applies stop/pause/resume to one or many modules, interpreting the
//! shutdown strategy and keeping a bounded log of outcomes. A failing module
//! never rolls back the modules already stopped in the same batch.

use super::{ModuleRegistry, PriorityDeterminer};
use crate::clock::Clock;
use crate::error::Result;
use crate::models::{LifecycleAction, ModuleState, ShutdownReason, ShutdownStrategy};
use crate::observability::StructuredLogger;
use crate::resources::{ResourceKind, ResourceLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Default number of outcome records kept in memory
const DEFAULT_MAX_RECORDS: usize = 1000;

/// Outcome of one executor action on one module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownRecord {
    pub module_id: String,
    pub action: LifecycleAction,
    pub strategy: Option<ShutdownStrategy>,
    pub reason: Option<ShutdownReason>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of a batch shutdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub succeeded: Vec<String>,
    /// (module_id, error description)
    pub failed: Vec<(String, String)>,
}

impl ShutdownReport {
    /// True only if every targeted module transitioned cleanly
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn targeted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

pub struct ShutdownExecutor {
    registry: Arc<ModuleRegistry>,
    determiner: PriorityDeterminer,
    clock: Arc<dyn Clock>,
    logger: StructuredLogger,
    records: Mutex<VecDeque<ShutdownRecord>>,
    max_records: usize,
}

impl ShutdownExecutor {
    pub fn new(registry: Arc<ModuleRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            determiner: PriorityDeterminer::new(registry.clone()),
            registry,
            clock,
            logger: StructuredLogger::new("local"),
            records: Mutex::new(VecDeque::new()),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn determiner(&self) -> &PriorityDeterminer {
        &self.determiner
    }

    /// Stop one module.
    ///
    /// Graceful: if the module is running and has a pause callback, pause it
    /// first so in-flight work can settle, then stop. Immediate: stop directly.
    pub fn shutdown(
        &self,
        module_id: &str,
        strategy: ShutdownStrategy,
        reason: ShutdownReason,
    ) -> Result<bool> {
        let result = match strategy {
            ShutdownStrategy::Graceful => self.graceful_stop(module_id),
            ShutdownStrategy::Immediate => self.registry.stop(module_id),
        };
        self.record(module_id, LifecycleAction::Stop, Some(strategy), Some(reason), &result);
        result
    }

    fn graceful_stop(&self, module_id: &str) -> Result<bool> {
        let pausable = self.registry.state(module_id) == Some(ModuleState::Running)
            && self.registry.has_callback(module_id, LifecycleAction::Pause);

        let paused_ok = if pausable {
            match self.registry.pause(module_id) {
                Ok(ok) => ok,
                Err(e) => {
                    // Lost a race with another caller; stopping still applies.
                    debug!(module_id = %module_id, error = %e, "Skipping pause before stop");
                    true
                }
            }
        } else {
            true
        };

        let stopped_ok = self.registry.stop(module_id)?;
        Ok(paused_ok && stopped_ok)
    }

    /// Stop several modules in order. Failures are reported, not rolled back.
    pub fn shutdown_many<I, S>(
        &self,
        module_ids: I,
        strategy: ShutdownStrategy,
        reason: ShutdownReason,
    ) -> ShutdownReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = ShutdownReport::default();

        for id in module_ids {
            let id = id.as_ref();
            match self.shutdown(id, strategy, reason) {
                Ok(true) => report.succeeded.push(id.to_string()),
                Ok(false) => report
                    .failed
                    .push((id.to_string(), "callback failed".to_string())),
                Err(e) => report.failed.push((id.to_string(), e.to_string())),
            }
        }

        if !report.is_success() {
            error!(
                reason = %reason,
                strategy = %strategy,
                failed = ?report.failed,
                "Partial shutdown failure"
            );
        }
        self.logger
            .log_shutdown_batch(reason, strategy, report.succeeded.len(), report.failed.len());
        report
    }

    /// Stop every running module with `priority <= max_priority`
    pub fn shutdown_by_priority(
        &self,
        max_priority: i32,
        strategy: ShutdownStrategy,
        reason: ShutdownReason,
    ) -> ShutdownReport {
        let targets = self.determiner.by_priority_ceiling(max_priority, reason);
        self.shutdown_many(targets, strategy, reason)
    }

    /// Stop the `count` least critical running modules
    pub fn shutdown_by_count(
        &self,
        count: usize,
        strategy: ShutdownStrategy,
        reason: ShutdownReason,
    ) -> ShutdownReport {
        let targets = self.determiner.by_count(count, reason);
        self.shutdown_many(targets, strategy, reason)
    }

    /// Stop every running module whose `kind` usage exceeds `threshold`
    pub fn shutdown_by_resource_threshold(
        &self,
        kind: &ResourceKind,
        threshold: f64,
        strategy: ShutdownStrategy,
        reason: ShutdownReason,
        ledger: &dyn ResourceLedger,
    ) -> ShutdownReport {
        let targets = self
            .determiner
            .by_resource_threshold(kind, threshold, reason, ledger);
        self.shutdown_many(targets, strategy, reason)
    }

    /// Pause a module
    pub fn suspend(
        &self,
        module_id: &str,
        strategy: ShutdownStrategy,
        reason: ShutdownReason,
    ) -> Result<bool> {
        let result = self.registry.pause(module_id);
        self.record(module_id, LifecycleAction::Pause, Some(strategy), Some(reason), &result);
        result
    }

    /// Resume a paused module
    pub fn resume(&self, module_id: &str) -> Result<bool> {
        let result = self.registry.resume(module_id);
        self.record(module_id, LifecycleAction::Resume, None, None, &result);
        result
    }

    fn record(
        &self,
        module_id: &str,
        action: LifecycleAction,
        strategy: Option<ShutdownStrategy>,
        reason: Option<ShutdownReason>,
        result: &Result<bool>,
    ) {
        let (success, error) = match result {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("callback failed".to_string())),
            Err(e) => (false, Some(e.to_string())),
        };

        let record = ShutdownRecord {
            module_id: module_id.to_string(),
            action,
            strategy,
            reason,
            success,
            error,
            timestamp: self.clock.now(),
        };

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        while records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Recorded outcomes, most recent first
    pub fn history(&self, limit: Option<usize>) -> Vec<ShutdownRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::ModuleInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor_with(priorities: &[(&str, i32)]) -> ShutdownExecutor {
        let registry = Arc::new(ModuleRegistry::new());
        for (id, priority) in priorities {
            registry.register(ModuleInfo::new(*id, *id, *priority)).unwrap();
            registry.start(id).unwrap();
        }
        ShutdownExecutor::new(registry, Arc::new(SystemClock))
    }

    #[test]
    fn test_shutdown_by_priority_leaves_critical_running() {
        let executor = executor_with(&[("m1", 1), ("m2", 2), ("m3", 3), ("m4", 4), ("m5", 5)]);
        let report = executor.shutdown_by_priority(
            2,
            ShutdownStrategy::Graceful,
            ShutdownReason::ResourceCritical,
        );

        assert!(report.is_success());
        assert_eq!(report.succeeded, vec!["m1", "m2"]);

        let registry = executor.registry();
        for id in ["m1", "m2"] {
            assert_eq!(registry.state(id), Some(ModuleState::Stopped));
        }
        for id in ["m3", "m4", "m5"] {
            assert_eq!(registry.state(id), Some(ModuleState::Running));
        }
    }

    #[test]
    fn test_graceful_pauses_before_stop_when_supported() {
        let executor = executor_with(&[("worker", 1)]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        executor
            .registry()
            .register_pause_callback("worker", move |_| {
                o.lock().unwrap().push("pause");
                Ok(())
            })
            .unwrap();
        let o = order.clone();
        executor
            .registry()
            .register_shutdown_callback("worker", move |_| {
                o.lock().unwrap().push("stop");
                Ok(())
            })
            .unwrap();

        assert!(executor
            .shutdown("worker", ShutdownStrategy::Graceful, ShutdownReason::Maintenance)
            .unwrap());
        assert_eq!(*order.lock().unwrap(), vec!["pause", "stop"]);
    }

    #[test]
    fn test_immediate_skips_pause() {
        let executor = executor_with(&[("worker", 1)]);
        let pauses = Arc::new(AtomicUsize::new(0));
        let p = pauses.clone();
        executor
            .registry()
            .register_pause_callback("worker", move |_| {
                p.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(executor
            .shutdown("worker", ShutdownStrategy::Immediate, ShutdownReason::Emergency)
            .unwrap());
        assert_eq!(pauses.load(Ordering::SeqCst), 0);
        assert_eq!(
            executor.registry().state("worker"),
            Some(ModuleState::Stopped)
        );
    }

    #[test]
    fn test_partial_failure_does_not_roll_back() {
        let executor = executor_with(&[("ok", 1), ("broken", 2)]);
        executor
            .registry()
            .register_shutdown_callback("broken", |_| anyhow::bail!("refused"))
            .unwrap();

        let report = executor.shutdown_many(
            ["ok", "broken", "ghost"],
            ShutdownStrategy::Immediate,
            ShutdownReason::Manual,
        );

        assert!(!report.is_success());
        assert_eq!(report.targeted(), 3);
        assert_eq!(report.succeeded, vec!["ok"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(executor.registry().state("ok"), Some(ModuleState::Stopped));
        assert_eq!(executor.registry().state("broken"), Some(ModuleState::Stopped));
    }

    #[test]
    fn test_suspend_and_resume() {
        let executor = executor_with(&[("llm", 1)]);
        assert!(executor
            .suspend("llm", ShutdownStrategy::Graceful, ShutdownReason::ResourceCritical)
            .unwrap());
        assert_eq!(executor.registry().state("llm"), Some(ModuleState::Paused));

        assert!(executor.resume("llm").unwrap());
        assert_eq!(executor.registry().state("llm"), Some(ModuleState::Running));

        assert!(executor.resume("llm").unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_shutdown_by_count() {
        let executor = executor_with(&[("a", 3), ("b", 1), ("c", 2)]);
        let report =
            executor.shutdown_by_count(2, ShutdownStrategy::Immediate, ShutdownReason::Emergency);
        assert_eq!(report.succeeded, vec!["b", "c"]);
        assert_eq!(executor.registry().state("a"), Some(ModuleState::Running));
    }

    #[test]
    fn test_history_is_most_recent_first_and_bounded() {
        let executor = executor_with(&[("a", 1), ("b", 2), ("c", 3)]).with_max_records(2);
        executor.shutdown_many(
            ["a", "b", "c"],
            ShutdownStrategy::Immediate,
            ShutdownReason::Manual,
        );

        let history = executor.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].module_id, "c");
        assert_eq!(history[1].module_id, "b");
        assert!(history.iter().all(|r| r.success));
        assert_eq!(executor.history(Some(1)).len(), 1);
    }
}
