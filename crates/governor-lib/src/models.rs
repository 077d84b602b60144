//! Core data models shared by the governor components

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a generic module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Stopped => write!(f, "stopped"),
            ModuleState::Running => write!(f, "running"),
            ModuleState::Paused => write!(f, "paused"),
        }
    }
}

/// Requested lifecycle move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Start,
    Stop,
    Pause,
    Resume,
}

/// What a [`LifecycleAction`] means for a module in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    Apply(ModuleState),
    AlreadyThere,
    Illegal,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Pause => "pause",
            LifecycleAction::Resume => "resume",
        }
    }

    /// Start and stop are idempotent; pause and resume are strict.
    pub fn plan(&self, from: ModuleState) -> TransitionPlan {
        use ModuleState::*;
        match (self, from) {
            (LifecycleAction::Start, Stopped) => TransitionPlan::Apply(Running),
            (LifecycleAction::Start, Running) => TransitionPlan::AlreadyThere,
            (LifecycleAction::Start, Paused) => TransitionPlan::Illegal,
            (LifecycleAction::Stop, Running | Paused) => TransitionPlan::Apply(Stopped),
            (LifecycleAction::Stop, Stopped) => TransitionPlan::AlreadyThere,
            (LifecycleAction::Pause, Running) => TransitionPlan::Apply(Paused),
            (LifecycleAction::Pause, _) => TransitionPlan::Illegal,
            (LifecycleAction::Resume, Paused) => TransitionPlan::Apply(Running),
            (LifecycleAction::Resume, _) => TransitionPlan::Illegal,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and state of a registered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub module_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lower value = less critical = shut down first
    pub priority: i32,
    pub state: ModuleState,
}

impl ModuleInfo {
    pub fn new(module_id: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            module_id: module_id.into(),
            name: name.into(),
            description: String::new(),
            priority,
            state: ModuleState::Stopped,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// How a lifecycle transition is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStrategy {
    /// Pause before stopping where the module supports it
    Graceful,
    Immediate,
}

impl fmt::Display for ShutdownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownStrategy::Graceful => write!(f, "graceful"),
            ShutdownStrategy::Immediate => write!(f, "immediate"),
        }
    }
}

/// Audit tag attached to shutdown decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    Manual,
    ResourceCritical,
    Scheduled,
    Maintenance,
    Emergency,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Manual => write!(f, "manual"),
            ShutdownReason::ResourceCritical => write!(f, "resource_critical"),
            ShutdownReason::Scheduled => write!(f, "scheduled"),
            ShutdownReason::Maintenance => write!(f, "maintenance"),
            ShutdownReason::Emergency => write!(f, "emergency"),
        }
    }
}

/// Suspension state of an AI module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionState {
    Active,
    Suspended,
}

impl fmt::Display for SuspensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspensionState::Active => write!(f, "active"),
            SuspensionState::Suspended => write!(f, "suspended"),
        }
    }
}

/// Why an AI module is in its current suspension state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionReason {
    Manual,
    ResourceCritical,
    Scheduled,
}

impl fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspensionReason::Manual => write!(f, "manual"),
            SuspensionReason::ResourceCritical => write!(f, "resource_critical"),
            SuspensionReason::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl From<SuspensionReason> for ShutdownReason {
    fn from(reason: SuspensionReason) -> Self {
        match reason {
            SuspensionReason::Manual => ShutdownReason::Manual,
            SuspensionReason::ResourceCritical => ShutdownReason::ResourceCritical,
            SuspensionReason::Scheduled => ShutdownReason::Scheduled,
        }
    }
}
