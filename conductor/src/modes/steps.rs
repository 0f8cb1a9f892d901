//! `steps` mode: author executable step definitions for confirmed specifications.
//!
//! Each confirmed feature gets its step definitions, page objects, and helpers
//! generated, then one validation run records how many steps are still pending.
//! Business logic is out of reach for this mode.

use tracing::{info, warn};

use crate::core::lifecycle::{Transition, apply_transition};
use crate::core::types::{FeatureStatus, Mode, ModeName, Outcome};
use crate::error::WorkflowError;
use crate::io::validation::ValidationRequest;
use crate::workflow::WorkflowState;

use super::{
    FeatureOutcome, ModeContext, ModeController, ModeReport, apply_proposals, ensure_budget,
    generation_request, plural, resolve_targets,
};

pub struct StepsMode;

impl ModeController for StepsMode {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError> {
        let targets = resolve_targets(
            state,
            ctx,
            false,
            |record| record.status == FeatureStatus::Confirmed,
            "steps requires a confirmed specification",
        )?;

        let mut report = ModeReport::new(ModeName::Steps, "define_steps", "");
        if targets.is_empty() {
            report.summary = "no confirmed features waiting for steps".to_string();
            return Ok(report);
        }

        for id in &targets {
            let outcome = define_steps(state, ctx, id, &mut report.pending)?;
            report.features.push(outcome);
            ctx.save(state)?;
        }

        let failed = report.failed().len();
        report.summary = format!(
            "defined steps for {} of {}",
            targets.len() - failed,
            plural(targets.len(), "feature")
        );
        report.terminal = failed == 0;
        Ok(report)
    }
}

fn define_steps(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
    pending: &mut Vec<String>,
) -> Result<FeatureOutcome, WorkflowError> {
    ensure_budget(ctx, Mode::Steps)?;
    state.current_feature = Some(id.to_string());
    if !ctx.collaborators.specs.exists(id) {
        return Err(WorkflowError::MissingArtifact(format!(
            "specification document {} not found",
            ctx.collaborators.specs.path(id).display()
        )));
    }

    let request = generation_request(state, ctx, Mode::Steps, Some(id))?;
    let output = match ctx.collaborators.generator.generate(&request) {
        Ok(output) => output,
        Err(_) if ctx.deadline.is_exhausted() => {
            return Err(WorkflowError::Timeout { mode: Mode::Steps });
        }
        Err(err) => {
            warn!(feature = id, err = %err, "step generation failed");
            let reason = format!("step generation failed: {err:#}");
            if let Some(record) = state.feature_mut(id) {
                record.failure_reason = Some(reason.clone());
            }
            let mut outcome =
                FeatureOutcome::new(id, Outcome::Failed, Some(FeatureStatus::Confirmed));
            outcome.reason = Some(reason);
            return Ok(outcome);
        }
    };
    let snapshot = apply_proposals(state, ctx, Mode::Steps, &output.changes)?;
    pending.extend(output.pending);

    let timeout = ctx
        .deadline
        .remaining()
        .ok_or(WorkflowError::Timeout { mode: Mode::Steps })?;
    let validation = ctx.collaborators.validator.run(&ValidationRequest {
        scope: Some(id.to_string()),
        timeout,
    });
    // A run the deadline cut short cannot vouch for the new steps.
    ensure_budget(ctx, Mode::Steps)?;
    let validation = validation?;

    let now = ctx.now();
    let Some(record) = state.feature_mut(id) else {
        return Err(WorkflowError::MissingArtifact(format!(
            "feature '{id}' is not registered"
        )));
    };
    let next =
        apply_transition(record.status, Transition::DefineSteps).map_err(WorkflowError::violation)?;
    record.status = next;
    record.steps_defined_at.get_or_insert(now);
    record.test_results = validation.results();
    record.failure_reason = None;
    info!(
        feature = id,
        pending = validation.pending,
        files = snapshot.paths().len(),
        "steps defined"
    );

    let mut outcome = FeatureOutcome::new(id, Outcome::Succeeded, Some(next));
    outcome.attempts = 1;
    outcome.files = snapshot.paths();
    Ok(outcome)
}
