//! One wired-up set of governor components
//!
//! [`Governor`] owns a registry, executor, resource monitor and suspension
//! manager sharing one clock and logger. Nothing is global, so several
//! governors can live in the same process.

use crate::clock::{system_clock, Clock};
use crate::error::{GovernorError, Result};
use crate::lifecycle::{ModuleRegistry, ShutdownExecutor};
use crate::observability::StructuredLogger;
use crate::resources::{ResourceKind, ResourceMonitor, ResourceMonitorConfig, ResourceSampler};
use crate::suspension::{SuspensionConfig, SuspensionManager};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct GovernorBuilder {
    clock: Arc<dyn Clock>,
    node_name: String,
    monitor: ResourceMonitorConfig,
    suspension: SuspensionConfig,
    sampler: Option<Arc<dyn ResourceSampler>>,
    auto_suspend: bool,
}

impl Default for GovernorBuilder {
    fn default() -> Self {
        Self {
            clock: system_clock(),
            node_name: "local".to_string(),
            monitor: ResourceMonitorConfig::default(),
            suspension: SuspensionConfig::default(),
            sampler: None,
            auto_suspend: false,
        }
    }
}

impl GovernorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor.interval = interval;
        self
    }

    pub fn scheduler_interval(mut self, interval: Duration) -> Self {
        self.suspension.check_interval = interval;
        self
    }

    pub fn notification_threshold(mut self, threshold: f64) -> Self {
        self.monitor.notification_threshold = threshold;
        self
    }

    pub fn max_history(mut self, max_history: usize) -> Self {
        self.suspension.max_history = max_history;
        self
    }

    pub fn default_limits(mut self, limits: BTreeMap<ResourceKind, f64>) -> Self {
        self.monitor.default_limits = limits;
        self
    }

    pub fn sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Suspend AI modules automatically on CRITICAL resource alerts
    pub fn auto_suspend(mut self, enabled: bool) -> Self {
        self.auto_suspend = enabled;
        self
    }

    pub fn build(self) -> Result<Governor> {
        self.monitor.validate()?;
        if self.suspension.max_history == 0 {
            return Err(GovernorError::InvalidArgument(
                "max_history must be at least 1".to_string(),
            ));
        }
        if self.suspension.check_interval.is_zero() {
            return Err(GovernorError::InvalidArgument(
                "scheduler interval must be non-zero".to_string(),
            ));
        }

        let logger = StructuredLogger::new(self.node_name);
        let registry = Arc::new(ModuleRegistry::new());
        let executor = Arc::new(
            ShutdownExecutor::new(registry.clone(), self.clock.clone()).with_logger(logger.clone()),
        );
        let monitor = Arc::new(ResourceMonitor::new(self.monitor, self.clock.clone()));
        if let Some(sampler) = self.sampler {
            monitor.set_sampler(sampler);
        }
        let suspensions = Arc::new(
            SuspensionManager::new(executor.clone(), self.clock.clone(), self.suspension)
                .with_logger(logger.clone()),
        );
        if self.auto_suspend {
            suspensions.attach_resource_monitor(&monitor);
        }

        Ok(Governor {
            registry,
            executor,
            monitor,
            suspensions,
            logger,
            clock: self.clock,
        })
    }
}

pub struct Governor {
    registry: Arc<ModuleRegistry>,
    executor: Arc<ShutdownExecutor>,
    monitor: Arc<ResourceMonitor>,
    suspensions: Arc<SuspensionManager>,
    logger: StructuredLogger,
    clock: Arc<dyn Clock>,
}

impl Governor {
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<ShutdownExecutor> {
        &self.executor
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    pub fn suspensions(&self) -> &Arc<SuspensionManager> {
        &self.suspensions
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Track an AI module in both the resource monitor and the suspension
    /// manager. Nothing is left half-registered on failure.
    pub fn register_ai_module(
        &self,
        ai_module_id: &str,
        name: &str,
        limits: Option<BTreeMap<ResourceKind, f64>>,
    ) -> Result<()> {
        self.monitor.register_ai_module(ai_module_id, name, limits)?;
        if let Err(e) = self.suspensions.register_ai_module(ai_module_id, name) {
            let _ = self.monitor.unregister_ai_module(ai_module_id);
            return Err(e);
        }
        Ok(())
    }

    pub fn unregister_ai_module(&self, ai_module_id: &str) -> Result<()> {
        let monitored = self.monitor.unregister_ai_module(ai_module_id);
        let suspended = self.suspensions.unregister_ai_module(ai_module_id);
        monitored.and(suspended).map(|_| ())
    }

    /// Start both background loops. Must be called inside a tokio runtime.
    /// Start both loops. Returns false if either was already running or no
    /// tokio runtime is available.
    pub fn start(&self) -> bool {
        let monitor = self.monitor.start_monitoring();
        let scheduler = self.suspensions.start_monitoring();
        info!(
            node = %self.logger.node_name(),
            monitor = monitor,
            scheduler = scheduler,
            "Governor loops started"
        );
        monitor && scheduler
    }

    pub async fn stop(&self) {
        self.monitor.stop_monitoring().await;
        self.suspensions.stop_monitoring().await;
        info!(node = %self.logger.node_name(), "Governor loops stopped");
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_monitoring() && self.suspensions.is_monitoring()
    }
}
