//! Resource-governed module lifecycle controller
//!
//! This crate provides the core functionality for:
//! - Module registration and lifecycle transitions with host callbacks
//! - Priority-based selection and shutdown of modules
//! - Resource accounting and alerting for AI-workload modules
//! - Suspension, scheduled suspension windows and auto-resume
//! - Health checks and observability

mod callback;
pub mod clock;
pub mod error;
pub mod governor;
pub mod health;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod resources;
pub mod suspension;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EntityKind, GovernorError, Result};
pub use governor::{Governor, GovernorBuilder};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::{
    ModuleCallback, ModuleRegistry, PriorityDeterminer, ShutdownExecutor, ShutdownRecord,
    ShutdownReport,
};
pub use models::*;
pub use observability::{GovernorMetrics, StructuredLogger};
pub use resources::{
    AIResourceUsage, AlertLevel, ResourceAlert, ResourceKind, ResourceLedger, ResourceMonitor,
    ResourceMonitorConfig, ResourceSampler,
};
pub use suspension::{
    AISuspension, HistoryEntry, ScheduledSuspension, SuspensionConfig, SuspensionManager,
    SuspensionStats,
};
