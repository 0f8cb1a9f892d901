//! `requirements` mode: specification capture and human confirmation.
//!
//! Creates specification documents (create-only) as `draft`, confirms them,
//! rebuilds records from existing documents, and captures workflow context.
//! The mode stays held after drafting until the draft is confirmed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::core::classifier::classify_path;
use crate::core::constraints::{Authorization, MutationRequest, authorize_mutation};
use crate::core::lifecycle::{Transition, apply_transition};
use crate::core::types::{FeatureStatus, Mode, ModeName, MutationKind, Outcome};
use crate::error::WorkflowError;
use crate::io::generator::GenerationOutput;
use crate::io::specs::placeholder;
use crate::workflow::{FeatureRecord, WorkflowState};

use super::{
    FeatureOutcome, ModeContext, ModeController, ModeReport, apply_proposals, generation_request,
    plural,
};

pub struct RequirementsMode;

impl ModeController for RequirementsMode {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError> {
        check_context(state, &ctx.options.context)?;

        let mut report = if ctx.options.analyze {
            analyze(state, ctx)?
        } else if let Some(id) = ctx.feature {
            if ctx.options.confirm {
                confirm(state, ctx, id)?
            } else if ctx.options.human_override {
                revise(state, ctx, id)?
            } else {
                create(state, ctx, id)?
            }
        } else if !ctx.options.context.is_empty() {
            ModeReport::new(ModeName::Requirements, "capture_context", "")
        } else {
            return Err(WorkflowError::InvalidInput(
                "requirements needs a feature id, --analyze, or --context".to_string(),
            ));
        };

        let captured = capture_context(state, &ctx.options.context);
        if captured > 0 {
            let note = format!("captured {}", plural(captured, "context key"));
            report.summary = if report.summary.is_empty() {
                note
            } else {
                format!("{}; {note}", report.summary)
            };
        }
        Ok(report)
    }
}

/// Context is set once per workflow: re-setting a key to a different value is refused.
fn check_context(state: &WorkflowState, pairs: &[(String, String)]) -> Result<(), WorkflowError> {
    let conflicts: Vec<String> = pairs
        .iter()
        .filter_map(|(key, value)| match state.context.get(key) {
            Some(existing) if existing != value => Some(format!(
                "context '{key}' is already '{existing}' and cannot change to '{value}'"
            )),
            _ => None,
        })
        .collect();
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::ConstraintViolation(conflicts))
    }
}

fn capture_context(state: &mut WorkflowState, pairs: &[(String, String)]) -> usize {
    let mut captured = 0;
    for (key, value) in pairs {
        if !state.context.contains_key(key) {
            state.context.insert(key.clone(), value.clone());
            captured += 1;
        }
    }
    captured
}

fn create(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
) -> Result<ModeReport, WorkflowError> {
    let specs = ctx.collaborators.specs;
    if let Some(record) = state.feature(id) {
        if record.status != FeatureStatus::Draft {
            return Err(WorkflowError::violation(format!(
                "specification for '{id}' is '{}'; pass --human-override to revise it",
                record.status
            )));
        }
        let mut report = ModeReport::new(
            ModeName::Requirements,
            "create",
            format!("'{id}' is already drafted; confirm it with `requirements {id} --confirm`"),
        );
        report.features.push(FeatureOutcome::new(
            id,
            Outcome::Skipped,
            Some(FeatureStatus::Draft),
        ));
        report.terminal = false;
        return Ok(report);
    }

    let spec_path = specs.path(id);
    let mut outcome = FeatureOutcome::new(id, Outcome::Succeeded, Some(FeatureStatus::Draft));
    let mut pending = Vec::new();
    let summary = if specs.exists(id) {
        info!(feature = id, "registering existing specification");
        format!("registered existing specification for '{id}' as draft")
    } else {
        let request = generation_request(state, ctx, Mode::Requirements, Some(id))?;
        let output = ctx
            .collaborators
            .generator
            .generate(&request)
            .context("requirements generator failed")?;
        reject_stray_changes(&output, &spec_path, id)?;
        let contents = output
            .changes
            .iter()
            .find(|change| change.path == spec_path)
            .and_then(|change| change.contents.clone())
            .unwrap_or_else(|| placeholder(id));

        authorize_spec_mutation(state, ctx, &spec_path, MutationKind::Create, None)?;
        specs.create(id, &contents)?;
        pending = output.pending;
        outcome.files.push(spec_path.clone());
        info!(feature = id, path = %spec_path.display(), "specification drafted");
        format!("drafted '{id}'; confirm it with `requirements {id} --confirm`")
    };

    state
        .features
        .insert(id.to_string(), FeatureRecord::draft(ctx.now()));
    let mut report = ModeReport::new(ModeName::Requirements, "create", summary);
    report.features.push(outcome);
    report.pending = pending;
    report.terminal = false;
    Ok(report)
}

fn confirm(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
) -> Result<ModeReport, WorkflowError> {
    let specs = ctx.collaborators.specs;
    let status = registered_status(state, id)?;
    let spec_path = require_document(ctx, id)?;
    let next = apply_transition(status, Transition::Confirm).map_err(WorkflowError::violation)?;

    authorize_spec_mutation(state, ctx, &spec_path, MutationKind::Annotate, Some(status))?;
    specs.annotate(id, &format!("status={next}"))?;
    if let Some(record) = state.feature_mut(id) {
        record.status = next;
    }
    info!(feature = id, "specification confirmed");

    let mut report = ModeReport::new(
        ModeName::Requirements,
        "confirm",
        format!("confirmed '{id}'"),
    );
    report
        .features
        .push(FeatureOutcome::new(id, Outcome::Succeeded, Some(next)));
    Ok(report)
}

/// Human-confirmed rewrite of a specification's content. Status is unchanged.
fn revise(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
) -> Result<ModeReport, WorkflowError> {
    let status = registered_status(state, id)?;
    let spec_path = require_document(ctx, id)?;
    let request = generation_request(state, ctx, Mode::Requirements, Some(id))?;
    let output = ctx
        .collaborators
        .generator
        .generate(&request)
        .context("requirements generator failed")?;
    reject_stray_changes(&output, &spec_path, id)?;

    if output.changes.is_empty() {
        let mut report = ModeReport::new(
            ModeName::Requirements,
            "revise",
            format!("no revision proposed for '{id}'"),
        );
        report
            .features
            .push(FeatureOutcome::new(id, Outcome::Skipped, Some(status)));
        report.pending = output.pending;
        return Ok(report);
    }

    let snapshot = apply_proposals(state, ctx, Mode::Requirements, &output.changes)?;
    authorize_spec_mutation(state, ctx, &spec_path, MutationKind::Annotate, Some(status))?;
    ctx.collaborators
        .specs
        .annotate(id, "revised under human override")?;
    info!(feature = id, "specification revised under human override");

    let mut outcome = FeatureOutcome::new(id, Outcome::Succeeded, Some(status));
    outcome.files = snapshot.paths();
    let mut report = ModeReport::new(
        ModeName::Requirements,
        "revise",
        format!("revised '{id}' under human override"),
    );
    report.features.push(outcome);
    report.pending = output.pending;
    Ok(report)
}

/// Register every specification document that has no record yet.
fn analyze(state: &mut WorkflowState, ctx: &ModeContext<'_>) -> Result<ModeReport, WorkflowError> {
    let specs = ctx.collaborators.specs;
    let documented = specs.list()?;
    let now = ctx.now();
    let mut report = ModeReport::new(ModeName::Requirements, "analyze", "");

    for id in &documented {
        if state.features.contains_key(id) {
            continue;
        }
        state
            .features
            .insert(id.clone(), FeatureRecord::draft(now));
        let mut outcome = FeatureOutcome::new(id, Outcome::Succeeded, Some(FeatureStatus::Draft));
        outcome.files.push(specs.path(id));
        report.features.push(outcome);
    }
    for id in state.features.keys() {
        if !documented.contains(id) {
            report
                .pending
                .push(format!("feature '{id}' has no specification document"));
        }
    }
    report.summary = format!(
        "registered {} from {}",
        plural(report.features.len(), "new feature"),
        plural(documented.len(), "specification document")
    );
    Ok(report)
}

fn registered_status(state: &WorkflowState, id: &str) -> Result<FeatureStatus, WorkflowError> {
    state
        .feature(id)
        .map(|record| record.status)
        .ok_or_else(|| WorkflowError::MissingArtifact(format!("feature '{id}' is not registered")))
}

fn require_document(ctx: &ModeContext<'_>, id: &str) -> Result<PathBuf, WorkflowError> {
    let specs = ctx.collaborators.specs;
    let path = specs.path(id);
    if !specs.exists(id) {
        return Err(WorkflowError::MissingArtifact(format!(
            "specification document {} not found",
            path.display()
        )));
    }
    Ok(path)
}

fn reject_stray_changes(
    output: &GenerationOutput,
    spec_path: &Path,
    id: &str,
) -> Result<(), WorkflowError> {
    let stray: Vec<String> = output
        .changes
        .iter()
        .filter(|change| change.path != spec_path)
        .map(|change| {
            format!(
                "{}: requirements may only write the specification for '{id}'",
                change.path.display()
            )
        })
        .collect();
    if stray.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::ConstraintViolation(stray))
    }
}

fn authorize_spec_mutation(
    state: &WorkflowState,
    ctx: &ModeContext<'_>,
    path: &Path,
    kind: MutationKind,
    feature_status: Option<FeatureStatus>,
) -> Result<(), WorkflowError> {
    let request = MutationRequest {
        mode: state.mode,
        path,
        class: classify_path(&ctx.config.layout, path),
        kind,
        feature_status,
        human_override: ctx.options.human_override,
    };
    match authorize_mutation(&request) {
        Authorization::Allow => Ok(()),
        Authorization::Deny(reason) => Err(WorkflowError::ConstraintViolation(vec![reason])),
    }
}
