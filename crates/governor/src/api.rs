//! HTTP API for health checks, Prometheus metrics and read-only status views

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use governor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::GovernorMetrics,
    Governor, GovernorError, ModuleState, SuspensionState,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: GovernorMetrics,
    pub governor: Arc<Governor>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: GovernorMetrics, governor: Arc<Governor>) -> Self {
        Self {
            health_registry,
            metrics,
            governor,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(GovernorError);

impl From<GovernorError> for ApiError {
    fn from(e: GovernorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GovernorError::NotFound { .. } => StatusCode::NOT_FOUND,
            GovernorError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

/// Returns 200 unless a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ModuleQuery {
    pub state: Option<ModuleState>,
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
}

async fn list_modules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModuleQuery>,
) -> impl IntoResponse {
    let registry = state.governor.registry();
    let modules: Vec<_> = registry
        .by_priority(query.min_priority, query.max_priority)
        .into_iter()
        .filter(|m| query.state.map_or(true, |s| m.state == s))
        .collect();
    Json(modules)
}

async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let module = state
        .governor
        .registry()
        .get(&module_id)
        .ok_or_else(|| GovernorError::module_not_found(&module_id))?;
    Ok(Json(module))
}

async fn list_ai_modules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.governor.monitor().get_all())
}

async fn get_ai_module(
    State(state): State<Arc<AppState>>,
    Path(ai_module_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let usage = state
        .governor
        .monitor()
        .get(&ai_module_id)
        .ok_or_else(|| GovernorError::ai_module_not_found(&ai_module_id))?;
    Ok(Json(usage))
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspensionQuery {
    pub state: Option<SuspensionState>,
}

async fn list_suspensions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuspensionQuery>,
) -> impl IntoResponse {
    let suspensions = state.governor.suspensions();
    let records = match query.state {
        Some(s) => suspensions.by_state(s),
        None => suspensions.get_all(),
    };
    Json(records)
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub ai_module_id: Option<String>,
}

async fn suspension_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let suspensions = state.governor.suspensions();
    let history = match query.ai_module_id.as_deref() {
        Some(id) => suspensions.module_history(id, query.limit),
        None => suspensions.get_history(query.limit),
    };
    Json(history)
}

async fn suspension_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.governor.suspensions().get_stats())
}

async fn scheduled_suspensions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.governor.suspensions().all_scheduled())
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

async fn shutdown_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(state.governor.executor().history(query.limit))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/modules", get(list_modules))
        .route("/api/v1/modules/:module_id", get(get_module))
        .route("/api/v1/ai-modules", get(list_ai_modules))
        .route("/api/v1/ai-modules/:ai_module_id", get(get_ai_module))
        .route("/api/v1/suspensions", get(list_suspensions))
        .route("/api/v1/suspensions/history", get(suspension_history))
        .route("/api/v1/suspensions/stats", get(suspension_stats))
        .route("/api/v1/suspensions/scheduled", get(scheduled_suspensions))
        .route("/api/v1/shutdowns", get(shutdown_history))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
