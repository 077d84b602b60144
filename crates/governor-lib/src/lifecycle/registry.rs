//! Module registry and lifecycle state machine
//!
//! Holds every registered module together with its host callbacks. State
//! changes are applied under the entry's shard lock; callbacks run after the
//! lock is released so a callback may freely query the registry.

use super::ModuleCallback;
use crate::callback::invoke_guarded;
use crate::error::{EntityKind, GovernorError, Result};
use crate::models::{LifecycleAction, ModuleInfo, ModuleState, TransitionPlan};
use crate::observability::GovernorMetrics;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default, Clone)]
struct ModuleCallbacks {
    on_start: Option<ModuleCallback>,
    on_stop: Option<ModuleCallback>,
    on_pause: Option<ModuleCallback>,
    on_resume: Option<ModuleCallback>,
}

impl ModuleCallbacks {
    fn slot(&mut self, action: LifecycleAction) -> &mut Option<ModuleCallback> {
        match action {
            LifecycleAction::Start => &mut self.on_start,
            LifecycleAction::Stop => &mut self.on_stop,
            LifecycleAction::Pause => &mut self.on_pause,
            LifecycleAction::Resume => &mut self.on_resume,
        }
    }

    fn get(&self, action: LifecycleAction) -> Option<ModuleCallback> {
        match action {
            LifecycleAction::Start => self.on_start.clone(),
            LifecycleAction::Stop => self.on_stop.clone(),
            LifecycleAction::Pause => self.on_pause.clone(),
            LifecycleAction::Resume => self.on_resume.clone(),
        }
    }
}

fn hook_name(action: LifecycleAction) -> &'static str {
    match action {
        LifecycleAction::Start => "on_start",
        LifecycleAction::Stop => "on_stop",
        LifecycleAction::Pause => "on_pause",
        LifecycleAction::Resume => "on_resume",
    }
}

struct ModuleEntry {
    info: ModuleInfo,
    callbacks: ModuleCallbacks,
}

/// Registry of modules under lifecycle control
pub struct ModuleRegistry {
    /// Map of module_id -> entry
    modules: DashMap<String, ModuleEntry>,
    metrics: GovernorMetrics,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            metrics: GovernorMetrics::new(),
        }
    }

    /// Register a module. Its state always starts as stopped.
    pub fn register(&self, mut info: ModuleInfo) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        info.state = ModuleState::Stopped;
        match self.modules.entry(info.module_id.clone()) {
            Entry::Occupied(_) => Err(GovernorError::Duplicate {
                kind: EntityKind::Module,
                id: info.module_id,
            }),
            Entry::Vacant(slot) => {
                info!(
                    module_id = %info.module_id,
                    priority = info.priority,
                    "Registered module"
                );
                slot.insert(ModuleEntry {
                    info,
                    callbacks: ModuleCallbacks::default(),
                });
                self.metrics.module_registered();
                Ok(())
            }
        }
    }

    pub fn unregister(&self, module_id: &str) -> Result<ModuleInfo> {
        let (_, entry) = self
            .modules
            .remove(module_id)
            .ok_or_else(|| GovernorError::module_not_found(module_id))?;
        debug!(module_id = %module_id, "Unregistered module");
        self.metrics.module_unregistered();
        Ok(entry.info)
    }

    fn set_callback(
        &self,
        module_id: &str,
        action: LifecycleAction,
        callback: ModuleCallback,
    ) -> Result<()> {
        let mut entry = self
            .modules
            .get_mut(module_id)
            .ok_or_else(|| GovernorError::module_not_found(module_id))?;
        *entry.callbacks.slot(action) = Some(callback);
        Ok(())
    }

    pub fn register_startup_callback<F>(&self, module_id: &str, callback: F) -> Result<()>
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_callback(module_id, LifecycleAction::Start, Arc::new(callback))
    }

    pub fn register_shutdown_callback<F>(&self, module_id: &str, callback: F) -> Result<()>
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_callback(module_id, LifecycleAction::Stop, Arc::new(callback))
    }

    pub fn register_pause_callback<F>(&self, module_id: &str, callback: F) -> Result<()>
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_callback(module_id, LifecycleAction::Pause, Arc::new(callback))
    }

    pub fn register_resume_callback<F>(&self, module_id: &str, callback: F) -> Result<()>
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_callback(module_id, LifecycleAction::Resume, Arc::new(callback))
    }

    /// Whether a callback of the given kind is registered
    pub fn has_callback(&self, module_id: &str, action: LifecycleAction) -> bool {
        self.modules
            .get(module_id)
            .map(|e| e.callbacks.get(action).is_some())
            .unwrap_or(false)
    }

    pub fn start(&self, module_id: &str) -> Result<bool> {
        self.transition(module_id, LifecycleAction::Start)
    }

    pub fn stop(&self, module_id: &str) -> Result<bool> {
        self.transition(module_id, LifecycleAction::Stop)
    }

    pub fn pause(&self, module_id: &str) -> Result<bool> {
        self.transition(module_id, LifecycleAction::Pause)
    }

    pub fn resume(&self, module_id: &str) -> Result<bool> {
        self.transition(module_id, LifecycleAction::Resume)
    }

    /// Apply a lifecycle action.
    ///
    /// `Ok(true)`: transitioned (or already there) and the callback, if any,
    /// succeeded. `Ok(false)`: transitioned but the callback failed.
    pub fn transition(&self, module_id: &str, action: LifecycleAction) -> Result<bool> {
        let (from, to, callback) = {
            let mut entry = self
                .modules
                .get_mut(module_id)
                .ok_or_else(|| GovernorError::module_not_found(module_id))?;

            let from = entry.info.state;
            match action.plan(from) {
                TransitionPlan::AlreadyThere => {
                    debug!(module_id = %module_id, action = %action, state = %from, "Already in target state");
                    return Ok(true);
                }
                TransitionPlan::Illegal => {
                    return Err(GovernorError::invalid_transition(module_id, action.as_str(), from));
                }
                TransitionPlan::Apply(to) => {
                    entry.info.state = to;
                    (from, to, entry.callbacks.get(action))
                }
            }
        };

        let success = match callback {
            Some(cb) => invoke_guarded(module_id, hook_name(action), || cb(module_id)).is_ok(),
            None => true,
        };

        self.metrics.record_transition(action, success);
        info!(
            module_id = %module_id,
            action = %action,
            from = %from,
            to = %to,
            callback_ok = success,
            "Module state changed"
        );
        Ok(success)
    }

    pub fn get(&self, module_id: &str) -> Option<ModuleInfo> {
        self.modules.get(module_id).map(|e| e.info.clone())
    }

    pub fn state(&self, module_id: &str) -> Option<ModuleState> {
        self.modules.get(module_id).map(|e| e.info.state)
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    /// All modules, ordered by id
    pub fn all(&self) -> Vec<ModuleInfo> {
        let mut modules: Vec<ModuleInfo> = self.modules.iter().map(|e| e.info.clone()).collect();
        modules.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        modules
    }

    pub fn by_state(&self, state: ModuleState) -> Vec<ModuleInfo> {
        self.all().into_iter().filter(|m| m.state == state).collect()
    }

    /// Modules whose priority lies within the inclusive bounds
    pub fn by_priority(&self, min: Option<i32>, max: Option<i32>) -> Vec<ModuleInfo> {
        self.all()
            .into_iter()
            .filter(|m| min.map_or(true, |lo| m.priority >= lo))
            .filter(|m| max.map_or(true, |hi| m.priority <= hi))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
