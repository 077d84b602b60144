//! Resource monitor for AI modules
//!
//! Keeps the resource ledger, classifies every limited resource after each
//! update and fires alert callbacks on upward level transitions only. An
//! optional background loop re-evaluates the ledger, pulling fresh gauges
//! from a [`ResourceSampler`] when one is installed.

use super::{AIResourceUsage, AlertLevel, ResourceAlert, ResourceKind, ResourceLedger, ResourceSampler};
use crate::callback::invoke_guarded;
use crate::clock::Clock;
use crate::error::{EntityKind, GovernorError, Result};
use crate::observability::GovernorMetrics;
use crate::worker::LoopController;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Callback fired when a resource moves up into a level
pub type AlertCallback =
    Arc<dyn Fn(&ResourceAlert, &AIResourceUsage) -> anyhow::Result<()> + Send + Sync>;

/// Configuration for the resource monitor
#[derive(Debug, Clone)]
pub struct ResourceMonitorConfig {
    /// Background loop interval (default: 5 seconds)
    pub interval: Duration,
    /// Fraction of a limit at which WARNING starts (default: 0.8)
    pub notification_threshold: f64,
    /// Limits applied when a module registers without its own
    pub default_limits: BTreeMap<ResourceKind, f64>,
}

impl Default for ResourceMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            notification_threshold: super::DEFAULT_NOTIFICATION_THRESHOLD,
            default_limits: BTreeMap::new(),
        }
    }
}

impl ResourceMonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.notification_threshold > 0.0 && self.notification_threshold <= 1.0) {
            return Err(GovernorError::InvalidArgument(format!(
                "notification threshold must be in (0, 1], got {}",
                self.notification_threshold
            )));
        }
        if self.interval.is_zero() {
            return Err(GovernorError::InvalidArgument(
                "monitor interval must be non-zero".to_string(),
            ));
        }
        validate_limits(&self.default_limits)
    }
}

fn validate_limits(limits: &BTreeMap<ResourceKind, f64>) -> Result<()> {
    for (kind, limit) in limits {
        if !limit.is_finite() || *limit <= 0.0 {
            return Err(GovernorError::InvalidArgument(format!(
                "limit for {kind} must be a positive number, got {limit}"
            )));
        }
    }
    Ok(())
}

fn validate_amount(kind: &ResourceKind, amount: f64) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(GovernorError::InvalidArgument(format!(
            "{kind} value must be a non-negative number, got {amount}"
        )))
    }
}

/// Results from one background poll
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub modules: usize,
    pub sample_errors: usize,
    pub callback_failures: usize,
}

pub struct ResourceMonitor {
    config: ResourceMonitorConfig,
    /// Map of ai_module_id -> usage
    modules: DashMap<String, AIResourceUsage>,
    callbacks: RwLock<HashMap<AlertLevel, Vec<AlertCallback>>>,
    sampler: RwLock<Option<Arc<dyn ResourceSampler>>>,
    clock: Arc<dyn Clock>,
    worker: LoopController,
    metrics: GovernorMetrics,
}

impl ResourceMonitor {
    pub fn new(config: ResourceMonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            modules: DashMap::new(),
            callbacks: RwLock::new(HashMap::new()),
            sampler: RwLock::new(None),
            clock,
            worker: LoopController::new("resource_monitor"),
            metrics: GovernorMetrics::new(),
        }
    }

    pub fn config(&self) -> &ResourceMonitorConfig {
        &self.config
    }

    pub fn register_ai_module(
        &self,
        ai_module_id: &str,
        name: &str,
        limits: Option<BTreeMap<ResourceKind, f64>>,
    ) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        let limits = limits.unwrap_or_else(|| self.config.default_limits.clone());
        validate_limits(&limits)?;

        match self.modules.entry(ai_module_id.to_string()) {
            Entry::Occupied(_) => Err(GovernorError::Duplicate {
                kind: EntityKind::AiModule,
                id: ai_module_id.to_string(),
            }),
            Entry::Vacant(slot) => {
                info!(ai_module_id = %ai_module_id, limits = ?limits, "Tracking AI module resources");
                slot.insert(AIResourceUsage::new(
                    ai_module_id,
                    name,
                    limits,
                    self.clock.now(),
                ));
                self.metrics.ai_module_tracked();
                Ok(())
            }
        }
    }

    pub fn unregister_ai_module(&self, ai_module_id: &str) -> Result<AIResourceUsage> {
        let (_, usage) = self
            .modules
            .remove(ai_module_id)
            .ok_or_else(|| GovernorError::ai_module_not_found(ai_module_id))?;
        self.metrics.ai_module_untracked();
        debug!(ai_module_id = %ai_module_id, "Stopped tracking AI module");
        Ok(usage)
    }

    /// Install the source the background loop samples from
    pub fn set_sampler(&self, sampler: Arc<dyn ResourceSampler>) {
        *self.sampler.write().unwrap_or_else(PoisonError::into_inner) = Some(sampler);
    }

    /// Register a callback fired on upward transitions into `level`
    pub fn register_alert_callback<F>(&self, level: AlertLevel, callback: F)
    where
        F: Fn(&ResourceAlert, &AIResourceUsage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(level)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Overwrite gauges. Kinds not yet seen are merged in.
    ///
    /// Returns `Ok(false)` if an alert callback failed.
    pub fn update_resources<I>(&self, ai_module_id: &str, values: I) -> Result<bool>
    where
        I: IntoIterator<Item = (ResourceKind, f64)>,
    {
        let values: Vec<(ResourceKind, f64)> = values.into_iter().collect();
        for (kind, value) in &values {
            validate_amount(kind, *value)?;
        }

        self.mutate(ai_module_id, true, |usage| {
            usage.resources.extend(values);
        })
    }

    /// Overwrite configured ceilings and re-evaluate levels
    pub fn update_limits<I>(&self, ai_module_id: &str, limits: I) -> Result<bool>
    where
        I: IntoIterator<Item = (ResourceKind, f64)>,
    {
        let limits: BTreeMap<ResourceKind, f64> = limits.into_iter().collect();
        validate_limits(&limits)?;

        self.mutate(ai_module_id, false, |usage| {
            usage.limits.extend(limits);
        })
    }

    /// Make the named resources unlimited again. Their alert levels drop back
    /// to normal without firing callbacks.
    pub fn remove_limits<I>(&self, ai_module_id: &str, kinds: I) -> Result<bool>
    where
        I: IntoIterator<Item = ResourceKind>,
    {
        self.mutate(ai_module_id, false, |usage| {
            for kind in kinds {
                usage.limits.remove(&kind);
            }
        })
    }

    pub fn increment_token_usage(&self, ai_module_id: &str, tokens: i64) -> Result<bool> {
        self.increment(ai_module_id, ResourceKind::Tokens, tokens)
    }

    pub fn increment_api_calls(&self, ai_module_id: &str, calls: i64) -> Result<bool> {
        self.increment(ai_module_id, ResourceKind::ApiCalls, calls)
    }

    fn increment(&self, ai_module_id: &str, kind: ResourceKind, amount: i64) -> Result<bool> {
        if amount < 0 {
            return Err(GovernorError::InvalidArgument(format!(
                "{kind} increment must be >= 0, got {amount}"
            )));
        }
        self.mutate(ai_module_id, true, |usage| usage.add(kind, amount as f64))
    }

    pub fn reset_token_usage(&self, ai_module_id: &str) -> Result<bool> {
        self.mutate(ai_module_id, true, |usage| {
            usage.resources.insert(ResourceKind::Tokens, 0.0);
        })
    }

    pub fn reset_api_calls(&self, ai_module_id: &str) -> Result<bool> {
        self.mutate(ai_module_id, true, |usage| {
            usage.resources.insert(ResourceKind::ApiCalls, 0.0);
        })
    }

    /// Re-classify a module against its current limits without changing values
    pub fn reevaluate(&self, ai_module_id: &str) -> Result<bool> {
        self.mutate(ai_module_id, false, |_| {})
    }

    /// Apply `f` under the entry lock, then fire callbacks with the lock released.
    fn mutate<F>(&self, ai_module_id: &str, touch: bool, f: F) -> Result<bool>
    where
        F: FnOnce(&mut AIResourceUsage),
    {
        let (alerts, snapshot) = {
            let mut entry = self
                .modules
                .get_mut(ai_module_id)
                .ok_or_else(|| GovernorError::ai_module_not_found(ai_module_id))?;

            f(entry.value_mut());
            if touch {
                entry.last_updated = self.clock.now();
            }
            let alerts = entry.evaluate(self.config.notification_threshold);
            let snapshot = if alerts.is_empty() {
                None
            } else {
                Some(entry.value().clone())
            };
            (alerts, snapshot)
        };

        match snapshot {
            Some(snapshot) => Ok(self.dispatch(&alerts, &snapshot)),
            None => Ok(true),
        }
    }

    fn callbacks_for(&self, level: AlertLevel) -> Vec<AlertCallback> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&level)
            .cloned()
            .unwrap_or_default()
    }

    fn dispatch(&self, alerts: &[ResourceAlert], snapshot: &AIResourceUsage) -> bool {
        let mut all_ok = true;

        for alert in alerts {
            self.metrics.inc_resource_alerts(alert.level);
            if alert.level == AlertLevel::Critical {
                warn!(
                    ai_module_id = %alert.ai_module_id,
                    resource = %alert.resource,
                    value = alert.value,
                    limit = alert.limit,
                    "Resource reached critical level"
                );
            } else {
                info!(
                    ai_module_id = %alert.ai_module_id,
                    resource = %alert.resource,
                    level = %alert.level,
                    value = alert.value,
                    limit = alert.limit,
                    "Resource alert level raised"
                );
            }

            for callback in self.callbacks_for(alert.level) {
                if invoke_guarded(&alert.ai_module_id, "alert", || callback(alert, snapshot))
                    .is_err()
                {
                    all_ok = false;
                }
            }
        }

        all_ok
    }

    pub fn get(&self, ai_module_id: &str) -> Option<AIResourceUsage> {
        self.modules.get(ai_module_id).map(|u| u.value().clone())
    }

    /// Snapshots of all modules, ordered by id
    pub fn get_all(&self) -> Vec<AIResourceUsage> {
        let mut all: Vec<AIResourceUsage> = self.modules.iter().map(|u| u.value().clone()).collect();
        all.sort_by(|a, b| a.ai_module_id.cmp(&b.ai_module_id));
        all
    }

    pub fn alert_levels(&self, ai_module_id: &str) -> Result<BTreeMap<ResourceKind, AlertLevel>> {
        self.modules
            .get(ai_module_id)
            .map(|u| u.last_alert_level.clone())
            .ok_or_else(|| GovernorError::ai_module_not_found(ai_module_id))
    }

    pub fn contains(&self, ai_module_id: &str) -> bool {
        self.modules.contains_key(ai_module_id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// One pass of the background loop: sample (or re-evaluate) every module.
    /// Per-module failures are logged and counted, never propagated.
    pub async fn poll_once(&self) -> PollSummary {
        let start = Instant::now();
        let sampler = self
            .sampler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let ids: Vec<String> = self.modules.iter().map(|u| u.key().clone()).collect();
        let mut summary = PollSummary::default();

        for id in ids {
            let result = match &sampler {
                Some(sampler) => match sampler.sample(&id).await {
                    Ok(values) => self.update_resources(&id, values),
                    Err(e) => {
                        summary.sample_errors += 1;
                        self.metrics.inc_sampler_errors(&id);
                        warn!(ai_module_id = %id, error = %e, "Resource sampling failed");
                        continue;
                    }
                },
                None => self.reevaluate(&id),
            };

            match result {
                Ok(callbacks_ok) => {
                    summary.modules += 1;
                    if !callbacks_ok {
                        summary.callback_failures += 1;
                    }
                }
                Err(e) => {
                    // Unregistered mid-poll, or the sampler returned bad values.
                    debug!(ai_module_id = %id, error = %e, "Skipping module in poll");
                }
            }
        }

        self.metrics
            .observe_tick("resource_monitor", start.elapsed().as_secs_f64());
        summary
    }

    /// Spawn the background loop. Returns false if it was already running or
    /// there is no tokio runtime.
    pub fn start_monitoring(self: &Arc<Self>) -> bool {
        self.worker
            .start(Arc::downgrade(self), self.config.interval, |monitor: Arc<Self>| async move {
                monitor.poll_once().await;
            })
    }

    pub async fn stop_monitoring(&self) {
        self.worker.stop().await;
    }

    pub fn is_monitoring(&self) -> bool {
        self.worker.is_running()
    }
}

impl ResourceLedger for ResourceMonitor {
    fn resource_value(&self, module_id: &str, kind: &ResourceKind) -> Option<f64> {
        self.modules
            .get(module_id)
            .and_then(|u| u.resources.get(kind).copied())
    }
}
