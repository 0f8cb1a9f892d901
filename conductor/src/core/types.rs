//! Shared deterministic types for the workflow core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// The active role of the workflow. Exactly one is held at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Requirements,
    Steps,
    Implement,
    Refactor,
    StepOptimize,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Requirements => "requirements",
            Mode::Steps => "steps",
            Mode::Implement => "implement",
            Mode::Refactor => "refactor",
            Mode::StepOptimize => "step_optimize",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mode name accepted by the dispatcher: the five real modes plus the
/// `status` and `reset` pseudo-modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    Requirements,
    Steps,
    Implement,
    Refactor,
    StepOptimize,
    Status,
    Reset,
}

impl ModeName {
    pub const ALL: [ModeName; 7] = [
        ModeName::Requirements,
        ModeName::Steps,
        ModeName::Implement,
        ModeName::Refactor,
        ModeName::StepOptimize,
        ModeName::Status,
        ModeName::Reset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModeName::Requirements => "requirements",
            ModeName::Steps => "steps",
            ModeName::Implement => "implement",
            ModeName::Refactor => "refactor",
            ModeName::StepOptimize => "step_optimize",
            ModeName::Status => "status",
            ModeName::Reset => "reset",
        }
    }

    /// The mode this name holds while running, or `None` for pseudo-modes.
    pub fn active_mode(self) -> Option<Mode> {
        match self {
            ModeName::Requirements => Some(Mode::Requirements),
            ModeName::Steps => Some(Mode::Steps),
            ModeName::Implement => Some(Mode::Implement),
            ModeName::Refactor => Some(Mode::Refactor),
            ModeName::StepOptimize => Some(Mode::StepOptimize),
            ModeName::Status | ModeName::Reset => None,
        }
    }

    pub fn is_pseudo(self) -> bool {
        self.active_mode().is_none()
    }
}

impl fmt::Display for ModeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeName {
    type Err = WorkflowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        ModeName::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| WorkflowError::UnknownMode(raw.to_string()))
    }
}

/// Linear lifecycle of a feature. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Draft,
    Confirmed,
    StepsDefined,
    Implementing,
    Completed,
    Failed,
}

impl FeatureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStatus::Draft => "draft",
            FeatureStatus::Confirmed => "confirmed",
            FeatureStatus::StepsDefined => "steps_defined",
            FeatureStatus::Implementing => "implementing",
            FeatureStatus::Completed => "completed",
            FeatureStatus::Failed => "failed",
        }
    }

    /// Position along the forward lifecycle. `Failed` sits beside `Completed`.
    pub fn rank(self) -> u8 {
        match self {
            FeatureStatus::Draft => 0,
            FeatureStatus::Confirmed => 1,
            FeatureStatus::StepsDefined => 2,
            FeatureStatus::Implementing => 3,
            FeatureStatus::Completed | FeatureStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FeatureStatus::Completed | FeatureStatus::Failed)
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classes of artifacts a role may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactClass {
    SpecificationDocument,
    StepDefinition,
    PageObject,
    Helper,
    BusinessLogic,
    /// Any path outside the configured layout. Never writable.
    Unclassified,
}

impl ArtifactClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactClass::SpecificationDocument => "specification document",
            ArtifactClass::StepDefinition => "step definition",
            ArtifactClass::PageObject => "page object",
            ArtifactClass::Helper => "helper",
            ArtifactClass::BusinessLogic => "business logic",
            ArtifactClass::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of mutation requested against an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Modify,
    Delete,
    /// Append metadata/status annotations without touching body content.
    Annotate,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Modify => "modify",
            MutationKind::Delete => "delete",
            MutationKind::Annotate => "annotate",
        }
    }
}

/// Aggregate counts from one validation run. Overwritten wholesale per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
}

/// Structured result reported by the validation-run collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
    #[serde(default)]
    pub failure_details: Vec<String>,
}

impl ValidationReport {
    pub fn is_green(&self) -> bool {
        self.failed == 0
    }

    pub fn results(&self) -> TestResults {
        TestResults {
            passed: self.passed,
            failed: self.failed,
            pending: self.pending,
        }
    }
}

/// Classification of a failed validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    MissingDependency,
    Timeout,
    Unrecoverable,
}

impl FailureClass {
    pub fn is_recoverable(self) -> bool {
        !matches!(self, FailureClass::Unrecoverable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::MissingDependency => "missing_dependency",
            FailureClass::Timeout => "timeout",
            FailureClass::Unrecoverable => "unrecoverable",
        }
    }
}

/// Outcome recorded in history and per-feature reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}
