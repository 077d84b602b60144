//! Error taxonomy for the lifecycle controller
//!
//! Expected failures (unknown ids, illegal moves, bad arguments) are typed
//! values returned through [`Result`]. Host callback failures are captured as
//! [`GovernorError::Callback`] but are only logged; the public API reports
//! them as `Ok(false)`.

use std::fmt;
use thiserror::Error;

/// Result alias used across the governor library
pub type Result<T> = std::result::Result<T, GovernorError>;

/// Which collection an id was looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Module,
    AiModule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Module => write!(f, "module"),
            EntityKind::AiModule => write!(f, "AI module"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} '{id}' is already registered")]
    Duplicate { kind: EntityKind, id: String },

    #[error("cannot {action} '{id}' while it is {state}")]
    InvalidTransition {
        id: String,
        action: &'static str,
        state: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{hook} callback for '{id}' failed: {message}")]
    Callback {
        id: String,
        hook: &'static str,
        message: String,
    },
}

impl GovernorError {
    pub fn module_not_found(id: &str) -> Self {
        GovernorError::NotFound {
            kind: EntityKind::Module,
            id: id.to_string(),
        }
    }

    pub fn ai_module_not_found(id: &str) -> Self {
        GovernorError::NotFound {
            kind: EntityKind::AiModule,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(id: &str, action: &'static str, state: impl fmt::Display) -> Self {
        GovernorError::InvalidTransition {
            id: id.to_string(),
            action,
            state: state.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GovernorError::NotFound { .. })
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, GovernorError::InvalidTransition { .. })
    }
}
