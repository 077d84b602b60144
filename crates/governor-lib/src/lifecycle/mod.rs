//! Generic module lifecycle control
//!
//! This module provides:
//! - A registry of modules with a stopped/running/paused state machine
//! - Priority-based selection of modules to act on under pressure
//! - A shutdown executor that applies stop/pause/resume in batches

mod executor;
mod priority;
mod registry;

pub use executor::{ShutdownExecutor, ShutdownRecord, ShutdownReport};
pub use priority::PriorityDeterminer;
pub use registry::ModuleRegistry;

use std::sync::Arc;

/// Host-supplied start/stop/pause/resume implementation for a module
pub type ModuleCallback = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;
