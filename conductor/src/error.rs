//! Workflow error taxonomy.
//!
//! Domain failures are typed so the CLI can map them to stable exit codes and
//! callers can branch on them. I/O and serialization failures stay as
//! `anyhow::Error` inside [`WorkflowError::Internal`].

use thiserror::Error;

use crate::core::types::{Mode, ModeName};
use crate::exit_codes;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown mode '{0}' (expected one of: requirements, steps, implement, refactor, step_optimize, status, reset)")]
    UnknownMode(String),

    #[error(
        "mode conflict: '{active}' is active; finish it or pass --force to switch to '{requested}'"
    )]
    ModeConflict { active: Mode, requested: ModeName },

    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    #[error("constraint violation: {}", .0.join("; "))]
    ConstraintViolation(Vec<String>),

    #[error("baseline not green: {failed} failing check(s) before {mode}")]
    BaselineNotGreen { mode: Mode, failed: u32 },

    #[error("validation failure after {attempts} attempt(s): {reason}")]
    ValidationFailure { attempts: u32, reason: String },

    #[error("{mode} timed out")]
    Timeout { mode: Mode },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn violation(message: impl Into<String>) -> Self {
        WorkflowError::ConstraintViolation(vec![message.into()])
    }

    /// Stable process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkflowError::UnknownMode(_) => exit_codes::UNKNOWN_MODE,
            WorkflowError::ModeConflict { .. } => exit_codes::MODE_CONFLICT,
            WorkflowError::MissingArtifact(_) => exit_codes::MISSING_ARTIFACT,
            WorkflowError::ConstraintViolation(_) => exit_codes::CONSTRAINT_VIOLATION,
            WorkflowError::BaselineNotGreen { .. } => exit_codes::BASELINE_NOT_GREEN,
            WorkflowError::ValidationFailure { .. } => exit_codes::VALIDATION_FAILURE,
            WorkflowError::Timeout { .. } => exit_codes::TIMEOUT,
            WorkflowError::InvalidInput(_) | WorkflowError::Internal(_) => exit_codes::INVALID,
        }
    }

    /// Short machine-friendly label used in history entries.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::UnknownMode(_) => "unknown_mode",
            WorkflowError::ModeConflict { .. } => "mode_conflict",
            WorkflowError::MissingArtifact(_) => "missing_artifact",
            WorkflowError::ConstraintViolation(_) => "constraint_violation",
            WorkflowError::BaselineNotGreen { .. } => "baseline_not_green",
            WorkflowError::ValidationFailure { .. } => "validation_failure",
            WorkflowError::Timeout { .. } => "timeout",
            WorkflowError::InvalidInput(_) => "invalid_input",
            WorkflowError::Internal(_) => "internal",
        }
    }
}
