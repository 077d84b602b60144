//! Suspension manager
//!
//! Owns the ACTIVE/SUSPENDED record of every tracked AI module. Suspending a
//! module that is also registered as a lifecycle module pauses it through the
//! shutdown executor; resuming undoes only a pause the suspension made itself.
//! Record locks are always released before the executor or any host callback
//! runs.

use super::history::SuspensionHistory;
use super::scheduler::ScheduleQueue;
use super::{
    AISuspension, HistoryEntry, ScheduledSuspension, SchedulerCommand, SuspensionConfig,
    SuspensionStats, TickSummary,
};
use crate::callback::invoke_guarded;
use crate::clock::Clock;
use crate::error::{EntityKind, GovernorError, Result};
use crate::lifecycle::ShutdownExecutor;
use crate::models::{ModuleState, ShutdownStrategy, SuspensionReason, SuspensionState};
use crate::observability::{GovernorMetrics, StructuredLogger};
use crate::resources::{AlertLevel, ResourceMonitor};
use crate::worker::LoopController;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Callback fired after a module enters a suspension state
pub type SuspensionCallback =
    Arc<dyn Fn(&str, SuspensionState, &AISuspension) -> anyhow::Result<()> + Send + Sync>;

/// What a suspend request changed
enum SuspendChange {
    AlreadySuspended,
    ReasonChanged {
        previous: SuspensionReason,
    },
    Suspended(AISuspension),
}

/// Outcome of pausing the lifecycle module behind a suspension
enum LifecyclePause {
    NotPaused,
    /// The module is now paused; `ok` is false if its pause callback failed
    Paused { ok: bool },
    Failed,
}

pub struct SuspensionManager {
    executor: Arc<ShutdownExecutor>,
    clock: Arc<dyn Clock>,
    config: SuspensionConfig,
    records: DashMap<String, AISuspension>,
    schedule: Mutex<ScheduleQueue>,
    history: Mutex<SuspensionHistory>,
    callbacks: RwLock<HashMap<SuspensionState, Vec<SuspensionCallback>>>,
    logger: StructuredLogger,
    worker: LoopController,
    metrics: GovernorMetrics,
}

impl SuspensionManager {
    pub fn new(
        executor: Arc<ShutdownExecutor>,
        clock: Arc<dyn Clock>,
        config: SuspensionConfig,
    ) -> Self {
        Self {
            executor,
            clock,
            history: Mutex::new(SuspensionHistory::new(config.max_history)),
            config,
            records: DashMap::new(),
            schedule: Mutex::new(ScheduleQueue::default()),
            callbacks: RwLock::new(HashMap::new()),
            logger: StructuredLogger::new("local"),
            worker: LoopController::new("suspension_scheduler"),
            metrics: GovernorMetrics::new(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn executor(&self) -> &Arc<ShutdownExecutor> {
        &self.executor
    }

    pub fn register_ai_module(&self, ai_module_id: &str, name: &str) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(ai_module_id.to_string()) {
            Entry::Occupied(_) => Err(GovernorError::Duplicate {
                kind: EntityKind::AiModule,
                id: ai_module_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(AISuspension::new(ai_module_id, name));
                debug!(ai_module_id = %ai_module_id, "Registered AI module for suspension control");
                Ok(())
            }
        }
    }

    /// Forget a module together with its pending schedules
    pub fn unregister_ai_module(&self, ai_module_id: &str) -> Result<AISuspension> {
        let (_, record) = self
            .records
            .remove(ai_module_id)
            .ok_or_else(|| GovernorError::ai_module_not_found(ai_module_id))?;

        let dropped = self.lock_schedule().cancel(ai_module_id);
        if record.is_suspended() {
            self.metrics.ai_module_resumed();
        }
        debug!(ai_module_id = %ai_module_id, dropped_schedules = dropped, "Unregistered AI module");
        Ok(record)
    }

    /// Register a callback fired after a module enters `state`
    pub fn register_callback<F>(&self, state: SuspensionState, callback: F)
    where
        F: Fn(&str, SuspensionState, &AISuspension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(state)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Suspend a module, optionally resuming it automatically after `resume_after`.
    ///
    /// Suspending an already suspended module with the same reason is a no-op
    /// success. With a different reason the record is re-tagged and the change
    /// is recorded, but the module is not paused again.
    pub fn suspend(
        &self,
        ai_module_id: &str,
        reason: SuspensionReason,
        strategy: ShutdownStrategy,
        resume_after: Option<Duration>,
    ) -> Result<bool> {
        let resume_at = match resume_after {
            Some(after) => {
                let after = chrono::Duration::from_std(after).map_err(|e| {
                    GovernorError::InvalidArgument(format!("resume_after out of range: {e}"))
                })?;
                Some(self.clock.now() + after)
            }
            None => None,
        };
        self.apply_suspend(ai_module_id, reason, strategy, resume_at)
    }

    fn apply_suspend(
        &self,
        ai_module_id: &str,
        reason: SuspensionReason,
        strategy: ShutdownStrategy,
        resume_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let now = self.clock.now();

        // History is appended under the record guard so its order matches
        // the order of record writes.
        let change = {
            let mut record = self
                .records
                .get_mut(ai_module_id)
                .ok_or_else(|| GovernorError::ai_module_not_found(ai_module_id))?;

            if resume_at.is_some() {
                record.resume_at = resume_at;
            }
            match (record.state, record.reason) {
                (SuspensionState::Suspended, Some(current)) if current == reason => {
                    SuspendChange::AlreadySuspended
                }
                (SuspensionState::Suspended, previous) => {
                    record.reason = Some(reason);
                    record.strategy = Some(strategy);
                    self.append_history(
                        ai_module_id,
                        now,
                        SuspensionState::Suspended,
                        SuspensionState::Suspended,
                        reason,
                        strategy,
                    );
                    SuspendChange::ReasonChanged {
                        previous: previous.unwrap_or(reason),
                    }
                }
                (SuspensionState::Active, _) => {
                    record.state = SuspensionState::Suspended;
                    record.reason = Some(reason);
                    record.strategy = Some(strategy);
                    record.suspended_at = Some(now);
                    record.paused_module = false;
                    self.append_history(
                        ai_module_id,
                        now,
                        SuspensionState::Active,
                        SuspensionState::Suspended,
                        reason,
                        strategy,
                    );
                    SuspendChange::Suspended(record.value().clone())
                }
            }
        };

        let snapshot = match change {
            SuspendChange::AlreadySuspended => {
                debug!(ai_module_id = %ai_module_id, reason = %reason, "Already suspended");
                return Ok(true);
            }
            SuspendChange::ReasonChanged { previous } => {
                info!(
                    ai_module_id = %ai_module_id,
                    previous = %previous,
                    reason = %reason,
                    "Suspension reason changed"
                );
                return Ok(true);
            }
            SuspendChange::Suspended(snapshot) => snapshot,
        };

        self.metrics.ai_module_suspended();
        self.logger
            .log_suspension_change(ai_module_id, SuspensionState::Suspended, reason, strategy);

        let paused_ok = match self.pause_lifecycle_module(ai_module_id, reason, strategy) {
            LifecyclePause::NotPaused => true,
            LifecyclePause::Paused { ok } => self.mark_module_paused(ai_module_id) && ok,
            LifecyclePause::Failed => false,
        };
        let callbacks_ok = self.fire_callbacks(ai_module_id, SuspensionState::Suspended, &snapshot);
        Ok(paused_ok && callbacks_ok)
    }

    /// Resume a suspended module and clear any pending auto-resume
    pub fn resume(&self, ai_module_id: &str) -> Result<bool> {
        self.apply_resume(ai_module_id, SuspensionReason::Manual)
    }

    fn apply_resume(&self, ai_module_id: &str, reason: SuspensionReason) -> Result<bool> {
        let now = self.clock.now();

        let (snapshot, strategy, paused_module) = {
            let mut record = self
                .records
                .get_mut(ai_module_id)
                .ok_or_else(|| GovernorError::ai_module_not_found(ai_module_id))?;

            if !record.is_suspended() {
                return Err(GovernorError::invalid_transition(
                    ai_module_id,
                    "resume",
                    record.state,
                ));
            }

            let strategy = record.strategy.unwrap_or(ShutdownStrategy::Graceful);
            let paused_module = std::mem::take(&mut record.paused_module);
            record.state = SuspensionState::Active;
            record.reason = None;
            record.strategy = None;
            record.suspended_at = None;
            record.resume_at = None;
            self.append_history(
                ai_module_id,
                now,
                SuspensionState::Suspended,
                SuspensionState::Active,
                reason,
                strategy,
            );
            (record.value().clone(), strategy, paused_module)
        };

        self.metrics.ai_module_resumed();
        self.logger
            .log_suspension_change(ai_module_id, SuspensionState::Active, reason, strategy);

        let resumed_ok = !paused_module || self.resume_lifecycle_module(ai_module_id);
        let callbacks_ok = self.fire_callbacks(ai_module_id, SuspensionState::Active, &snapshot);
        Ok(resumed_ok && callbacks_ok)
    }

    /// Pause the matching lifecycle module if there is one and it is running
    fn pause_lifecycle_module(
        &self,
        ai_module_id: &str,
        reason: SuspensionReason,
        strategy: ShutdownStrategy,
    ) -> LifecyclePause {
        if self.executor.registry().state(ai_module_id) != Some(ModuleState::Running) {
            return LifecyclePause::NotPaused;
        }
        match self.executor.suspend(ai_module_id, strategy, reason.into()) {
            Ok(ok) => LifecyclePause::Paused { ok },
            Err(e) => {
                warn!(ai_module_id = %ai_module_id, error = %e, "Could not pause module");
                LifecyclePause::Failed
            }
        }
    }

    /// Record that this suspension owns the lifecycle pause. If the record was
    /// resumed while the executor ran, the pause is handed straight back.
    fn mark_module_paused(&self, ai_module_id: &str) -> bool {
        let owned = match self.records.get_mut(ai_module_id) {
            Some(mut record) if record.is_suspended() => {
                record.paused_module = true;
                true
            }
            _ => false,
        };
        owned || self.resume_lifecycle_module(ai_module_id)
    }

    fn resume_lifecycle_module(&self, ai_module_id: &str) -> bool {
        if self.executor.registry().state(ai_module_id) != Some(ModuleState::Paused) {
            return true;
        }
        match self.executor.resume(ai_module_id) {
            Ok(ok) => ok,
            Err(e) => {
                warn!(ai_module_id = %ai_module_id, error = %e, "Could not resume module");
                false
            }
        }
    }

    fn fire_callbacks(&self, ai_module_id: &str, state: SuspensionState, snapshot: &AISuspension) -> bool {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&state)
            .cloned()
            .unwrap_or_default();

        callbacks.iter().fold(true, |ok, callback| {
            invoke_guarded(ai_module_id, "suspension", || callback(ai_module_id, state, snapshot))
                .is_ok()
                && ok
        })
    }

    fn append_history(
        &self,
        ai_module_id: &str,
        timestamp: DateTime<Utc>,
        old_state: SuspensionState,
        new_state: SuspensionState,
        reason: SuspensionReason,
        strategy: ShutdownStrategy,
    ) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HistoryEntry {
                ai_module_id: ai_module_id.to_string(),
                timestamp,
                old_state,
                new_state,
                reason,
                strategy,
            });
    }

    fn lock_schedule(&self) -> std::sync::MutexGuard<'_, ScheduleQueue> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a suspension window for a known module
    pub fn schedule_suspension(
        &self,
        ai_module_id: &str,
        suspend_at: DateTime<Utc>,
        resume_at: DateTime<Utc>,
        reason: SuspensionReason,
        strategy: ShutdownStrategy,
    ) -> Result<()> {
        if !self.records.contains_key(ai_module_id) {
            return Err(GovernorError::ai_module_not_found(ai_module_id));
        }
        if resume_at <= suspend_at {
            return Err(GovernorError::InvalidArgument(format!(
                "resume_at ({resume_at}) must be after suspend_at ({suspend_at})"
            )));
        }

        self.lock_schedule().push(ScheduledSuspension {
            ai_module_id: ai_module_id.to_string(),
            suspend_at,
            resume_at,
            reason,
            strategy,
        });
        info!(
            ai_module_id = %ai_module_id,
            suspend_at = %suspend_at,
            resume_at = %resume_at,
            reason = %reason,
            "Scheduled suspension"
        );
        Ok(())
    }

    pub fn get_scheduled_suspensions(&self, ai_module_id: &str) -> Result<Vec<ScheduledSuspension>> {
        if !self.records.contains_key(ai_module_id) {
            return Err(GovernorError::ai_module_not_found(ai_module_id));
        }
        Ok(self.lock_schedule().for_module(ai_module_id))
    }

    /// Every pending window, in queue order
    pub fn all_scheduled(&self) -> Vec<ScheduledSuspension> {
        self.lock_schedule().all()
    }

    /// Drop every pending window for a module, returning how many were removed
    pub fn cancel_scheduled_suspension(&self, ai_module_id: &str) -> Result<usize> {
        if !self.records.contains_key(ai_module_id) {
            return Err(GovernorError::ai_module_not_found(ai_module_id));
        }
        let removed = self.lock_schedule().cancel(ai_module_id);
        info!(ai_module_id = %ai_module_id, removed = removed, "Cancelled scheduled suspensions");
        Ok(removed)
    }

    /// Auto-resumes whose time has come, ordered by id
    fn due_resumes(&self, now: DateTime<Utc>) -> Vec<SchedulerCommand> {
        let mut due: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.resume_due(now))
            .map(|r| r.key().clone())
            .collect();
        due.sort();
        due.into_iter()
            .map(|ai_module_id| SchedulerCommand::AutoResume { ai_module_id })
            .collect()
    }

    fn execute(&self, command: &SchedulerCommand) -> Result<bool> {
        match command {
            SchedulerCommand::ExecuteScheduled(entry) => self.apply_suspend(
                &entry.ai_module_id,
                entry.reason,
                entry.strategy,
                Some(entry.resume_at),
            ),
            SchedulerCommand::AutoResume { ai_module_id } => {
                self.apply_resume(ai_module_id, SuspensionReason::Scheduled)
            }
        }
    }

    /// One scheduler iteration. Executes due schedules, then auto-resumes
    /// whose time has come, including those set by the schedules just run.
    pub fn run_pending(&self) -> TickSummary {
        let start = Instant::now();
        let mut summary = TickSummary::default();

        let scheduled: Vec<SchedulerCommand> = self
            .lock_schedule()
            .take_due(self.clock.now())
            .into_iter()
            .map(SchedulerCommand::ExecuteScheduled)
            .collect();
        let mut handled = self.run_commands(&scheduled, &mut summary);

        // Resume checks see the records the scheduled suspensions just wrote
        let resumes = self.due_resumes(self.clock.now());
        handled += self.run_commands(&resumes, &mut summary);

        self.metrics
            .observe_tick("suspension_scheduler", start.elapsed().as_secs_f64());
        if handled > 0 {
            debug!(
                executed = summary.executed,
                resumed = summary.resumed,
                failures = summary.failures,
                "Scheduler tick"
            );
        }
        summary
    }

    fn run_commands(&self, commands: &[SchedulerCommand], summary: &mut TickSummary) -> usize {
        for command in commands {
            let outcome = self.execute(command);
            let success = matches!(outcome, Ok(true));
            self.metrics.record_scheduler_command(command.name(), success);

            match (&outcome, command) {
                (Ok(_), SchedulerCommand::ExecuteScheduled(_)) => summary.executed += 1,
                (Ok(_), SchedulerCommand::AutoResume { .. }) => summary.resumed += 1,
                (Err(e), _) => warn!(
                    ai_module_id = %command.ai_module_id(),
                    command = command.name(),
                    error = %e,
                    "Scheduler command failed"
                ),
            }
            if !success {
                summary.failures += 1;
            }
        }
        commands.len()
    }

    /// Spawn the scheduler loop. Returns false if it was already running or
    /// there is no tokio runtime.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        self.worker.start(
            Arc::downgrade(self),
            self.config.check_interval,
            |manager: Arc<Self>| async move {
                manager.run_pending();
            },
        )
    }

    pub async fn stop_monitoring(&self) {
        self.worker.stop().await;
    }

    pub fn is_monitoring(&self) -> bool {
        self.worker.is_running()
    }

    /// Suspend modules automatically when any of their resources goes CRITICAL.
    ///
    /// Only modules registered with this manager are affected. The monitor
    /// holds a weak reference, so dropping the manager disables the wiring.
    pub fn attach_resource_monitor(self: &Arc<Self>, monitor: &ResourceMonitor) {
        let manager = Arc::downgrade(self);
        monitor.register_alert_callback(AlertLevel::Critical, move |alert, _usage| {
            let Some(manager) = manager.upgrade() else {
                return Ok(());
            };
            if !manager.contains(&alert.ai_module_id) {
                return Ok(());
            }
            manager.suspend(
                &alert.ai_module_id,
                SuspensionReason::ResourceCritical,
                ShutdownStrategy::Graceful,
                None,
            )?;
            Ok(())
        });
    }

    pub fn get(&self, ai_module_id: &str) -> Option<AISuspension> {
        self.records.get(ai_module_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, ai_module_id: &str) -> bool {
        self.records.contains_key(ai_module_id)
    }

    /// Snapshots of all records, ordered by id
    pub fn get_all(&self) -> Vec<AISuspension> {
        let mut all: Vec<AISuspension> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.ai_module_id.cmp(&b.ai_module_id));
        all
    }

    pub fn by_state(&self, state: SuspensionState) -> Vec<AISuspension> {
        self.get_all()
            .into_iter()
            .filter(|r| r.state == state)
            .collect()
    }

    /// Most recent first
    pub fn get_history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent(None, limit)
    }

    pub fn module_history(&self, ai_module_id: &str, limit: Option<usize>) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent(Some(ai_module_id), limit)
    }

    pub fn get_stats(&self) -> SuspensionStats {
        let records = self.get_all();
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        SuspensionStats::compute(&history, &records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
