//! `implement` mode: write business logic until the feature's scenarios pass.
//!
//! Each target moves to `implementing`, gets business logic generated, then
//! goes through the retry handler. Green ends `completed`, anything else ends
//! `failed` with the last failure reason. Features run one at a time and the
//! state is checkpointed after each so an interrupted batch resumes cleanly.

use tracing::{info, warn};

use crate::core::lifecycle::{Transition, apply_transition};
use crate::core::types::{FeatureStatus, Mode, ModeName, Outcome};
use crate::error::WorkflowError;
use crate::io::validation::ValidationRequest;
use crate::retry::{RetryPolicy, run_with_retry};
use crate::workflow::{FeatureRecord, WorkflowState};

use super::{
    FeatureOutcome, ModeContext, ModeController, ModeReport, apply_proposals, ensure_budget,
    generation_request, plural, resolve_targets,
};

pub struct ImplementMode;

impl ModeController for ImplementMode {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError> {
        let options = ctx.options;
        let targets = resolve_targets(
            state,
            ctx,
            options.retry || options.force,
            |record| entry_transition(record.status, options.retry, options.force).is_some(),
            requirement(options.retry, options.force),
        )?;

        let mut report = ModeReport::new(ModeName::Implement, "implement", "");
        if targets.is_empty() {
            report.summary = "no features ready for implementation".to_string();
            return Ok(report);
        }

        for id in &targets {
            let outcome = implement_feature(state, ctx, id, &mut report.pending)?;
            report.features.push(outcome);
        }

        let failed = report.failed().len();
        report.summary = format!(
            "{} completed, {} failed of {}",
            targets.len() - failed,
            failed,
            plural(targets.len(), "feature")
        );
        report.terminal = failed == 0;
        Ok(report)
    }
}

/// Lifecycle edge that lets `status` enter `implementing` under the given flags.
fn entry_transition(status: FeatureStatus, retry: bool, force: bool) -> Option<Transition> {
    match status {
        FeatureStatus::StepsDefined | FeatureStatus::Implementing => {
            Some(Transition::StartImplementation)
        }
        FeatureStatus::Failed if retry => Some(Transition::Retry),
        FeatureStatus::Failed | FeatureStatus::Completed if force => Some(Transition::Reopen),
        _ => None,
    }
}

fn requirement(retry: bool, force: bool) -> &'static str {
    if force {
        "implement --force requires defined steps or a finished feature"
    } else if retry {
        "implement --retry requires defined steps or a failed feature"
    } else {
        "implement requires defined steps (use --retry or --force to re-open)"
    }
}

fn implement_feature(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
    pending: &mut Vec<String>,
) -> Result<FeatureOutcome, WorkflowError> {
    ensure_budget(ctx, Mode::Implement)?;
    let options = ctx.options;
    let before = state
        .feature(id)
        .cloned()
        .ok_or_else(|| WorkflowError::MissingArtifact(format!("feature '{id}' is not registered")))?;
    let Some(transition) = entry_transition(before.status, options.retry, options.force) else {
        return Err(WorkflowError::violation(format!(
            "feature '{id}' is '{}'; {}",
            before.status,
            requirement(options.retry, options.force)
        )));
    };
    let status = apply_transition(before.status, transition).map_err(WorkflowError::violation)?;

    let now = ctx.now();
    if let Some(record) = state.feature_mut(id) {
        record.status = status;
        record.implementation_started_at.get_or_insert(now);
        record.failure_reason = None;
    }
    state.current_feature = Some(id.to_string());
    ctx.save(state)?;
    info!(feature = id, from = %before.status, "implementation started");

    let request = generation_request(state, ctx, Mode::Implement, Some(id))?;
    let output = match ctx.collaborators.generator.generate(&request) {
        Ok(output) => output,
        Err(_) if ctx.deadline.is_exhausted() => return time_out(state, ctx, id, before),
        Err(err) => {
            warn!(feature = id, err = %err, "implementation generator failed");
            let reason = format!("implementation generation failed: {err:#}");
            return finish_failed(state, ctx, id, reason, 0);
        }
    };
    let snapshot = match apply_proposals(state, ctx, Mode::Implement, &output.changes) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            restore_record(state, id, before);
            ctx.save(state)?;
            return Err(err);
        }
    };
    pending.extend(output.pending);

    let validator = ctx.collaborators.validator;
    let retried = run_with_retry(
        |attempt, timeout| {
            info!(feature = id, attempt, "validating implementation");
            validator.run(&ValidationRequest {
                scope: Some(id.to_string()),
                timeout,
            })
        },
        RetryPolicy {
            max_attempts: ctx.config.max_attempts,
            deadline: ctx.deadline,
        },
        ctx.collaborators.classifier,
        ctx.collaborators.fixer,
    );

    if retried.budget_exhausted {
        return time_out(state, ctx, id, before);
    }

    if let Some(record) = state.feature_mut(id)
        && let Some(last) = &retried.last_report
    {
        record.test_results = last.results();
    }

    if !retried.success {
        let reason = retried
            .last_failure_reason
            .unwrap_or_else(|| "validation failed".to_string());
        let mut outcome = finish_failed(state, ctx, id, reason, retried.attempts_used)?;
        outcome.files = snapshot.paths();
        return Ok(outcome);
    }

    let completed = apply_transition(status, Transition::Complete).map_err(WorkflowError::violation)?;
    if let Some(record) = state.feature_mut(id) {
        record.status = completed;
    }
    state.current_feature = None;
    ctx.save(state)?;
    info!(feature = id, attempts = retried.attempts_used, "implementation completed");

    let mut outcome = FeatureOutcome::new(id, Outcome::Succeeded, Some(completed));
    outcome.attempts = retried.attempts_used;
    outcome.files = snapshot.paths();
    Ok(outcome)
}

fn finish_failed(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
    reason: String,
    attempts: u32,
) -> Result<FeatureOutcome, WorkflowError> {
    let Some(record) = state.feature_mut(id) else {
        return Err(WorkflowError::MissingArtifact(format!(
            "feature '{id}' is not registered"
        )));
    };
    record.status = apply_transition(record.status, Transition::Fail).map_err(WorkflowError::violation)?;
    record.failure_reason = Some(reason.clone());
    state.current_feature = None;
    ctx.save(state)?;
    warn!(feature = id, attempts, reason = %reason, "implementation failed");

    let mut outcome = FeatureOutcome::new(id, Outcome::Failed, Some(FeatureStatus::Failed));
    outcome.attempts = attempts;
    outcome.reason = Some(reason);
    Ok(outcome)
}

/// Abort with `Timeout`, leaving the feature neither advanced nor failed.
fn time_out(
    state: &mut WorkflowState,
    ctx: &ModeContext<'_>,
    id: &str,
    before: FeatureRecord,
) -> Result<FeatureOutcome, WorkflowError> {
    warn!(feature = id, "time budget exhausted; leaving status unchanged");
    restore_record(state, id, before);
    ctx.save(state)?;
    Err(WorkflowError::Timeout {
        mode: Mode::Implement,
    })
}

/// Put a record back exactly as it was before this run touched it.
fn restore_record(state: &mut WorkflowState, id: &str, before: FeatureRecord) {
    state.features.insert(id.to_string(), before);
    state.current_feature = None;
}
