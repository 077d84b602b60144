//! Observability infrastructure for the module governor
//!
//! Provides:
//! - Prometheus metrics (lifecycle transitions, alerts, suspensions, loop latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{LifecycleAction, ShutdownReason, ShutdownStrategy, SuspensionReason, SuspensionState};
use crate::resources::ResourceAlert;
use crate::AlertLevel;

/// Histogram buckets for loop tick latency (in seconds)
const TICK_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GovernorMetricsInner> = OnceLock::new();

struct GovernorMetricsInner {
    modules_registered: IntGauge,
    ai_modules_tracked: IntGauge,
    ai_modules_suspended: IntGauge,
    transitions: IntCounterVec,
    callback_failures: IntCounterVec,
    resource_alerts: IntCounterVec,
    scheduler_commands: IntCounterVec,
    sampler_errors: IntCounterVec,
    loop_tick_seconds: HistogramVec,
}

impl GovernorMetricsInner {
    fn new() -> Self {
        Self {
            modules_registered: register_int_gauge!(
                "governor_modules_registered",
                "Number of modules registered with the lifecycle registry"
            )
            .expect("Failed to register modules_registered"),

            ai_modules_tracked: register_int_gauge!(
                "governor_ai_modules_tracked",
                "Number of AI modules tracked by the resource monitor"
            )
            .expect("Failed to register ai_modules_tracked"),

            ai_modules_suspended: register_int_gauge!(
                "governor_ai_modules_suspended",
                "Number of AI modules currently suspended"
            )
            .expect("Failed to register ai_modules_suspended"),

            transitions: register_int_counter_vec!(
                "governor_module_transitions_total",
                "Lifecycle transitions by action and outcome",
                &["action", "outcome"]
            )
            .expect("Failed to register module_transitions_total"),

            callback_failures: register_int_counter_vec!(
                "governor_callback_failures_total",
                "Host callbacks that returned an error or panicked",
                &["hook"]
            )
            .expect("Failed to register callback_failures_total"),

            resource_alerts: register_int_counter_vec!(
                "governor_resource_alerts_total",
                "Upward alert level transitions by level",
                &["level"]
            )
            .expect("Failed to register resource_alerts_total"),

            scheduler_commands: register_int_counter_vec!(
                "governor_scheduler_commands_total",
                "Commands executed by the suspension scheduling loop",
                &["command", "outcome"]
            )
            .expect("Failed to register scheduler_commands_total"),

            sampler_errors: register_int_counter_vec!(
                "governor_sampler_errors_total",
                "Resource sampler failures per AI module",
                &["ai_module_id"]
            )
            .expect("Failed to register sampler_errors_total"),

            loop_tick_seconds: register_histogram_vec!(
                "governor_loop_tick_seconds",
                "Time spent in one background loop iteration",
                &["worker"],
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register loop_tick_seconds"),
        }
    }
}

/// Lightweight handle to the process-wide governor metrics
///
/// Clones share the same underlying Prometheus collectors, so several
/// governors in one process report into the same series.
#[derive(Clone)]
pub struct GovernorMetrics {
    _private: (),
}

impl Default for GovernorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GovernorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GovernorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GovernorMetricsInner {
        GLOBAL_METRICS.get_or_init(GovernorMetricsInner::new)
    }

    pub fn module_registered(&self) {
        self.inner().modules_registered.inc();
    }

    pub fn module_unregistered(&self) {
        self.inner().modules_registered.dec();
    }

    pub fn ai_module_tracked(&self) {
        self.inner().ai_modules_tracked.inc();
    }

    pub fn ai_module_untracked(&self) {
        self.inner().ai_modules_tracked.dec();
    }

    pub fn ai_module_suspended(&self) {
        self.inner().ai_modules_suspended.inc();
    }

    pub fn ai_module_resumed(&self) {
        self.inner().ai_modules_suspended.dec();
    }

    pub fn record_transition(&self, action: LifecycleAction, success: bool) {
        let outcome = if success { "success" } else { "callback_failed" };
        self.inner()
            .transitions
            .with_label_values(&[action.as_str(), outcome])
            .inc();
    }

    pub fn inc_callback_failures(&self, hook: &str) {
        self.inner()
            .callback_failures
            .with_label_values(&[hook])
            .inc();
    }

    pub fn inc_resource_alerts(&self, level: AlertLevel) {
        self.inner()
            .resource_alerts
            .with_label_values(&[level.as_str()])
            .inc();
    }

    pub fn record_scheduler_command(&self, command: &str, success: bool) {
        let outcome = if success { "success" } else { "failed" };
        self.inner()
            .scheduler_commands
            .with_label_values(&[command, outcome])
            .inc();
    }

    pub fn inc_sampler_errors(&self, ai_module_id: &str) {
        self.inner()
            .sampler_errors
            .with_label_values(&[ai_module_id])
            .inc();
    }

    pub fn observe_tick(&self, worker: &str, duration_secs: f64) {
        self.inner()
            .loop_tick_seconds
            .with_label_values(&[worker])
            .observe(duration_secs);
    }
}

/// Structured logger for governor events
///
/// Emits the canonical `event = "..."` records that operators grep for.
/// Hosts typically call it from their alert and suspension callbacks.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, modules: usize, ai_modules: usize) {
        info!(
            event = "governor_started",
            node = %self.node_name,
            version = %version,
            modules = modules,
            ai_modules = ai_modules,
            "Module governor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "governor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Module governor shutting down"
        );
    }

    pub fn log_module_transition(&self, module_id: &str, action: LifecycleAction, success: bool) {
        if success {
            info!(
                event = "module_transition",
                node = %self.node_name,
                module_id = %module_id,
                action = %action,
                "Module transitioned"
            );
        } else {
            warn!(
                event = "module_transition",
                node = %self.node_name,
                module_id = %module_id,
                action = %action,
                "Module transitioned but its callback failed"
            );
        }
    }

    pub fn log_resource_alert(&self, alert: &ResourceAlert) {
        match alert.level {
            AlertLevel::Critical => {
                warn!(
                    event = "resource_alert",
                    node = %self.node_name,
                    ai_module_id = %alert.ai_module_id,
                    resource = %alert.resource,
                    level = %alert.level,
                    previous = %alert.previous,
                    value = alert.value,
                    limit = alert.limit,
                    "Critical resource alert"
                );
            }
            _ => {
                info!(
                    event = "resource_alert",
                    node = %self.node_name,
                    ai_module_id = %alert.ai_module_id,
                    resource = %alert.resource,
                    level = %alert.level,
                    previous = %alert.previous,
                    value = alert.value,
                    limit = alert.limit,
                    "Resource alert"
                );
            }
        }
    }

    pub fn log_suspension_change(
        &self,
        ai_module_id: &str,
        state: SuspensionState,
        reason: SuspensionReason,
        strategy: ShutdownStrategy,
    ) {
        info!(
            event = "suspension_changed",
            node = %self.node_name,
            ai_module_id = %ai_module_id,
            state = %state,
            reason = %reason,
            strategy = %strategy,
            "AI module suspension state changed"
        );
    }

    pub fn log_shutdown_batch(
        &self,
        reason: ShutdownReason,
        strategy: ShutdownStrategy,
        succeeded: usize,
        failed: usize,
    ) {
        if failed == 0 {
            info!(
                event = "shutdown_batch",
                node = %self.node_name,
                reason = %reason,
                strategy = %strategy,
                succeeded = succeeded,
                "Shutdown batch completed"
            );
        } else {
            error!(
                event = "shutdown_batch",
                node = %self.node_name,
                reason = %reason,
                strategy = %strategy,
                succeeded = succeeded,
                failed = failed,
                "Shutdown batch partially failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceKind;

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = GovernorMetrics::new();
        let b = GovernorMetrics::new();

        a.record_transition(LifecycleAction::Start, true);
        b.inc_resource_alerts(AlertLevel::Critical);
        a.observe_tick("resource_monitor", 0.002);

        let families = prometheus::gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"governor_module_transitions_total".to_string()));
        assert!(names.contains(&"governor_resource_alerts_total".to_string()));
    }

    #[test]
    fn test_structured_logger_does_not_panic() {
        let logger = StructuredLogger::new("node-a");
        assert_eq!(logger.node_name(), "node-a");

        logger.log_startup("0.1.0", 3, 1);
        logger.log_module_transition("db", LifecycleAction::Stop, false);
        logger.log_resource_alert(&ResourceAlert {
            ai_module_id: "llm".into(),
            resource: ResourceKind::Gpu,
            level: AlertLevel::Critical,
            previous: AlertLevel::Normal,
            value: 95.0,
            limit: 90.0,
        });
        logger.log_suspension_change(
            "llm",
            SuspensionState::Suspended,
            SuspensionReason::ResourceCritical,
            ShutdownStrategy::Graceful,
        );
        logger.log_shutdown_batch(ShutdownReason::Emergency, ShutdownStrategy::Immediate, 2, 1);
        logger.log_shutdown("test");
    }
}
