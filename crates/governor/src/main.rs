//! Module Governor - resource-governed lifecycle controller service
//!
//! Registers the modules declared in configuration, runs the resource and
//! suspension loops and serves health, metrics and status views.

use anyhow::{Context, Result};
use governor_lib::{
    health::{components, ComponentHealth, HealthRegistry},
    observability::GovernorMetrics,
    AlertLevel, Governor, LifecycleAction,
};
use module_governor::{api, config::GovernorConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GOVERNOR_VERSION: &str = env!("CARGO_PKG_VERSION");
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting module-governor");

    let config = GovernorConfig::load()?;
    info!(node_name = %config.node_name, "Governor configured");

    let governor = Arc::new(
        config
            .governor_builder()
            .build()
            .context("failed to build governor")?,
    );
    register_declared_modules(&governor, &config)?;

    let logger = governor.logger().clone();
    for level in [AlertLevel::Warning, AlertLevel::Critical] {
        let logger = logger.clone();
        governor
            .monitor()
            .register_alert_callback(level, move |alert, _usage| {
                logger.log_resource_alert(alert);
                Ok(())
            });
    }

    let health_registry = HealthRegistry::with_governor_components().await;
    let metrics = GovernorMetrics::new();
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        governor.clone(),
    ));

    if !governor.start() {
        warn!("Governor loops were not all started");
    }
    logger.log_startup(
        GOVERNOR_VERSION,
        governor.registry().len(),
        governor.monitor().len(),
    );
    health_registry.set_ready(true).await;

    let watchdog = tokio::spawn(watch_health(governor.clone(), health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => warn!("API server exited"),
                Ok(Err(e)) => warn!(error = %e, "API server failed"),
                Err(e) => warn!(error = %e, "API server task panicked"),
            }
            logger.log_shutdown("API server stopped");
        }
    }

    health_registry.set_ready(false).await;
    watchdog.abort();
    governor.stop().await;
    info!("Shutting down");

    Ok(())
}

fn register_declared_modules(governor: &Governor, config: &GovernorConfig) -> Result<()> {
    let registry = governor.registry();
    for module in &config.modules {
        registry
            .register(module.to_info())
            .with_context(|| format!("failed to register module '{}'", module.id))?;

        if module.autostart {
            let ok = registry
                .start(&module.id)
                .with_context(|| format!("failed to start module '{}'", module.id))?;
            governor
                .logger()
                .log_module_transition(&module.id, LifecycleAction::Start, ok);
        }
    }

    for ai_module in &config.ai_modules {
        governor
            .register_ai_module(&ai_module.id, &ai_module.name, ai_module.limits.clone())
            .with_context(|| format!("failed to register AI module '{}'", ai_module.id))?;
    }

    info!(
        modules = config.modules.len(),
        ai_modules = config.ai_modules.len(),
        "Registered declared modules"
    );
    Ok(())
}

/// Mirror loop liveness into the health registry
async fn watch_health(governor: Arc<Governor>, health: HealthRegistry) {
    let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    loop {
        ticker.tick().await;
        health.set_healthy(components::MODULE_REGISTRY).await;
        health
            .update(
                components::RESOURCE_MONITOR,
                ComponentHealth::for_loop(governor.monitor().is_monitoring(), "resource monitor"),
            )
            .await;
        health
            .update(
                components::SUSPENSION_MANAGER,
                ComponentHealth::for_loop(governor.suspensions().is_monitoring(), "scheduler"),
            )
            .await;
    }
}
