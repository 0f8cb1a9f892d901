//! Mode controllers: one state-machine node per mode.
//!
//! Real modes share a three-phase shape: resolve the target features, delegate
//! artifact work to collaborators through the constraint enforcer, then advance
//! each feature one lifecycle edge. Controllers mutate the [`WorkflowState`]
//! they are handed; the dispatcher owns loading, persisting, and auditing it.

mod implement;
mod requirements;
mod reset;
mod restructure;
mod status;
mod steps;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::budget::Deadline;
use crate::core::constraints::allowed_classes;
use crate::core::failure::FailureClassifier;
use crate::core::invariants::validate_feature_id;
use crate::core::registry::FeatureRegistry;
use crate::core::types::{FeatureStatus, Mode, ModeName, Outcome};
use crate::error::WorkflowError;
use crate::io::artifacts::{
    ChangePolicy, PlannedChange, Snapshot, apply_changes, list_artifacts, plan_changes,
};
use crate::io::autofix::AutoFixer;
use crate::io::config::ConductorConfig;
use crate::io::generator::{ArtifactGenerator, GenerationRequest, ProposedChange};
use crate::io::paths::WorkspacePaths;
use crate::io::report::ReportWriter;
use crate::io::specs::SpecDocuments;
use crate::io::validation::Validator;
use crate::workflow::{FeatureRecord, WorkflowState};

pub use implement::ImplementMode;
pub use requirements::RequirementsMode;
pub use reset::ResetMode;
pub use restructure::RestructureMode;
pub use status::{StatusMode, StatusView};
pub use steps::StepsMode;

/// Mode-specific CLI options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeOptions {
    pub all: bool,
    pub retry: bool,
    pub force: bool,
    pub scope: Option<String>,
    pub hard: bool,
    pub analyze: bool,
    pub merge: bool,
    pub generalize: bool,
    pub confirm: bool,
    pub human_override: bool,
    /// `key=value` pairs captured into the workflow context.
    pub context: Vec<(String, String)>,
}

impl ModeOptions {
    /// Reject flags that mean nothing for `mode`.
    pub fn validate_for(&self, mode: ModeName, feature: Option<&str>) -> Result<(), WorkflowError> {
        let mut misplaced = Vec::new();
        let mut flag = |set: bool, name: &str, allowed: &[ModeName]| {
            if set && !allowed.contains(&mode) {
                misplaced.push(name.to_string());
            }
        };
        flag(self.all, "--all", &[ModeName::Steps, ModeName::Implement]);
        flag(self.retry, "--retry", &[ModeName::Implement, ModeName::Status]);
        flag(
            self.scope.is_some(),
            "--scope",
            &[ModeName::Refactor, ModeName::StepOptimize],
        );
        flag(self.hard, "--hard", &[ModeName::Reset]);
        flag(
            self.analyze,
            "--analyze",
            &[ModeName::Requirements, ModeName::Refactor, ModeName::StepOptimize],
        );
        flag(self.merge, "--merge", &[ModeName::StepOptimize]);
        flag(self.generalize, "--generalize", &[ModeName::StepOptimize]);
        flag(self.confirm, "--confirm", &[ModeName::Requirements]);
        flag(self.human_override, "--human-override", &[ModeName::Requirements]);
        flag(!self.context.is_empty(), "--context", &[ModeName::Requirements]);
        if !misplaced.is_empty() {
            return Err(WorkflowError::InvalidInput(format!(
                "{} not valid for {mode}",
                misplaced.join(", ")
            )));
        }

        if self.all && feature.is_some() {
            return Err(WorkflowError::InvalidInput(
                "--all cannot be combined with a feature id".to_string(),
            ));
        }
        if self.confirm && self.human_override {
            return Err(WorkflowError::InvalidInput(
                "--confirm and --human-override are separate steps".to_string(),
            ));
        }
        if let Some(id) = feature {
            validate_feature_id(id).map_err(WorkflowError::InvalidInput)?;
        }
        for (key, _) in &self.context {
            if key.trim().is_empty() {
                return Err(WorkflowError::InvalidInput(
                    "--context keys must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Directives forwarded to generators.
    pub fn directives(&self) -> Vec<String> {
        [
            (self.analyze, "analyze"),
            (self.merge, "merge"),
            (self.generalize, "generalize"),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| name.to_string())
        .collect()
    }
}

/// External collaborators a controller may call.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub specs: &'a dyn SpecDocuments,
    pub generator: &'a dyn ArtifactGenerator,
    pub validator: &'a dyn Validator,
    pub classifier: &'a dyn FailureClassifier,
    pub fixer: &'a dyn AutoFixer,
    pub reports: &'a dyn ReportWriter,
}

/// Everything a controller sees besides the state itself.
pub struct ModeContext<'a> {
    pub paths: &'a WorkspacePaths,
    pub config: &'a ConductorConfig,
    pub feature: Option<&'a str>,
    pub options: &'a ModeOptions,
    pub collaborators: Collaborators<'a>,
    pub deadline: Deadline,
    /// Persist progress mid-run (after each feature of a batch).
    pub checkpoint: &'a dyn Fn(&WorkflowState) -> Result<()>,
}

impl ModeContext<'_> {
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub(crate) fn save(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        (self.checkpoint)(state).map_err(WorkflowError::Internal)
    }
}

/// What happened to one feature during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureOutcome {
    pub id: String,
    pub outcome: Outcome,
    pub status: Option<FeatureStatus>,
    pub attempts: u32,
    pub reason: Option<String>,
    pub files: Vec<PathBuf>,
}

impl FeatureOutcome {
    pub fn new(id: &str, outcome: Outcome, status: Option<FeatureStatus>) -> Self {
        Self {
            id: id.to_string(),
            outcome,
            status,
            attempts: 0,
            reason: None,
            files: Vec::new(),
        }
    }
}

/// Result of one controller run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeReport {
    pub mode: ModeName,
    /// Short verb recorded in history (`define_steps`, `confirm`, ...).
    pub action: String,
    pub summary: String,
    pub features: Vec<FeatureOutcome>,
    /// Items a collaborator left for a human.
    pub pending: Vec<String>,
    /// The mode reached a terminal sub-state and releases its hold.
    #[serde(skip)]
    pub terminal: bool,
    #[serde(skip)]
    pub status: Option<StatusView>,
    /// Rendered report text, filled in by the dispatcher.
    #[serde(skip)]
    pub rendered: String,
    #[serde(skip)]
    pub report_path: Option<PathBuf>,
}

impl ModeReport {
    pub fn new(mode: ModeName, action: &str, summary: impl Into<String>) -> Self {
        Self {
            mode,
            action: action.to_string(),
            summary: summary.into(),
            features: Vec::new(),
            pending: Vec::new(),
            terminal: true,
            status: None,
            rendered: String::new(),
            report_path: None,
        }
    }

    pub fn failed(&self) -> Vec<&FeatureOutcome> {
        self.features
            .iter()
            .filter(|feature| feature.outcome == Outcome::Failed)
            .collect()
    }

    /// Overall outcome for the history entry.
    pub fn outcome(&self) -> Outcome {
        if !self.failed().is_empty() {
            Outcome::Failed
        } else if !self.features.is_empty()
            && self
                .features
                .iter()
                .all(|feature| feature.outcome == Outcome::Skipped)
        {
            Outcome::Skipped
        } else {
            Outcome::Succeeded
        }
    }

    /// Failure reasons joined for the history entry.
    pub fn failure_reason(&self) -> Option<String> {
        let reasons: Vec<String> = self
            .failed()
            .into_iter()
            .map(|feature| match &feature.reason {
                Some(reason) => format!("{}: {reason}", feature.id),
                None => feature.id.clone(),
            })
            .collect();
        (!reasons.is_empty()).then(|| reasons.join("; "))
    }
}

pub trait ModeController {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError>;
}

static REQUIREMENTS: RequirementsMode = RequirementsMode;
static STEPS: StepsMode = StepsMode;
static IMPLEMENT: ImplementMode = ImplementMode;
static REFACTOR: RestructureMode = RestructureMode {
    mode: Mode::Refactor,
    name: ModeName::Refactor,
};
static STEP_OPTIMIZE: RestructureMode = RestructureMode {
    mode: Mode::StepOptimize,
    name: ModeName::StepOptimize,
};
static STATUS: StatusMode = StatusMode;
static RESET: ResetMode = ResetMode;

/// Resolve the controller for a mode name.
pub fn controller_for(name: ModeName) -> &'static dyn ModeController {
    match name {
        ModeName::Requirements => &REQUIREMENTS,
        ModeName::Steps => &STEPS,
        ModeName::Implement => &IMPLEMENT,
        ModeName::Refactor => &REFACTOR,
        ModeName::StepOptimize => &STEP_OPTIMIZE,
        ModeName::Status => &STATUS,
        ModeName::Reset => &RESET,
    }
}

/// Scope resolution shared by the per-feature modes.
///
/// A named feature must exist and be eligible. `--all` takes every eligible
/// feature in registry priority order; otherwise the first eligible one is taken.
pub(crate) fn resolve_targets(
    state: &WorkflowState,
    ctx: &ModeContext<'_>,
    include_failed: bool,
    eligible: impl Fn(&FeatureRecord) -> bool,
    requirement: &str,
) -> Result<Vec<String>, WorkflowError> {
    let registry = FeatureRegistry::new(state);
    if let Some(id) = ctx.feature {
        let record = registry
            .get(id)
            .ok_or_else(|| WorkflowError::MissingArtifact(format!("feature '{id}' is not registered")))?;
        if !eligible(record) {
            return Err(WorkflowError::violation(format!(
                "feature '{id}' is '{}'; {requirement}",
                record.status
            )));
        }
        return Ok(vec![id.to_string()]);
    }

    let mut targets = registry
        .next(include_failed)
        .into_iter()
        .filter(|id| registry.get(id).is_some_and(&eligible))
        .map(str::to_string);
    if ctx.options.all {
        Ok(targets.collect())
    } else {
        Ok(targets.next().into_iter().collect())
    }
}

/// Fail with `Timeout` once the invocation's budget is gone.
pub(crate) fn ensure_budget(ctx: &ModeContext<'_>, mode: Mode) -> Result<(), WorkflowError> {
    if ctx.deadline.is_exhausted() {
        return Err(WorkflowError::Timeout { mode });
    }
    Ok(())
}

/// Build the generator request for `mode`, listing the artifacts it may touch.
pub(crate) fn generation_request(
    state: &WorkflowState,
    ctx: &ModeContext<'_>,
    mode: Mode,
    feature: Option<&str>,
) -> Result<GenerationRequest, WorkflowError> {
    let specs = ctx.collaborators.specs;
    let specification = match feature {
        Some(id) if specs.exists(id) => Some(specs.read(id)?),
        _ => None,
    };
    let existing = list_artifacts(&ctx.paths.root, &ctx.config.layout, &allowed_classes(mode))?;
    let timeout = ctx
        .deadline
        .remaining()
        .ok_or(WorkflowError::Timeout { mode })?;
    Ok(GenerationRequest {
        mode,
        feature_id: feature.map(str::to_string),
        specification,
        existing,
        directives: ctx.options.directives(),
        scope: ctx.options.scope.clone(),
        context: state.context.clone(),
        timeout,
    })
}

/// Classify and authorize a batch of proposals as `mode` without writing.
pub(crate) fn plan_proposals(
    state: &WorkflowState,
    ctx: &ModeContext<'_>,
    mode: Mode,
    changes: &[ProposedChange],
) -> Result<Vec<PlannedChange>, WorkflowError> {
    let policy = ChangePolicy {
        root: &ctx.paths.root,
        layout: &ctx.config.layout,
        mode,
        features: &state.features,
        human_override: ctx.options.human_override,
    };
    plan_changes(&policy, changes)
}

/// Authorize a batch of proposals as `mode` and write it. Nothing is written
/// unless every proposal is allowed.
pub(crate) fn apply_proposals(
    state: &WorkflowState,
    ctx: &ModeContext<'_>,
    mode: Mode,
    changes: &[ProposedChange],
) -> Result<Snapshot, WorkflowError> {
    let planned = plan_proposals(state, ctx, mode, changes)?;
    Ok(apply_changes(&ctx.paths.root, &planned)?)
}

pub(crate) fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
