//! `refactor` and `step_optimize`: behavior-preserving restructuring.
//!
//! Both require a green baseline before anything is written, apply the
//! generator's proposals, then validate again. A red post-check restores every
//! touched file from the pre-change snapshot. Feature statuses are never
//! touched by either mode.

use std::path::Path;

use tracing::{info, warn};

use crate::core::types::{Mode, ModeName, MutationKind, Outcome};
use crate::error::WorkflowError;
use crate::io::validation::ValidationRequest;
use crate::retry::{RetryOutcome, RetryPolicy, run_with_retry};
use crate::workflow::WorkflowState;

use super::{
    FeatureOutcome, ModeContext, ModeController, ModeReport, apply_proposals, ensure_budget,
    generation_request, plan_proposals, plural,
};

pub struct RestructureMode {
    pub mode: Mode,
    pub name: ModeName,
}

impl RestructureMode {
    /// One validation pass with no retries: restructuring must already be green.
    fn validate_once(&self, ctx: &ModeContext<'_>, scope: Option<&str>) -> RetryOutcome {
        let validator = ctx.collaborators.validator;
        run_with_retry(
            |_, timeout| {
                validator.run(&ValidationRequest {
                    scope: scope.map(str::to_string),
                    timeout,
                })
            },
            RetryPolicy {
                max_attempts: 1,
                deadline: ctx.deadline,
            },
            ctx.collaborators.classifier,
            ctx.collaborators.fixer,
        )
    }
}

impl ModeController for RestructureMode {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError> {
        let mode = self.mode;
        ensure_budget(ctx, mode)?;
        if let Some(id) = ctx.feature
            && state.feature(id).is_none()
        {
            return Err(WorkflowError::MissingArtifact(format!(
                "feature '{id}' is not registered"
            )));
        }
        let scope = ctx.options.scope.as_deref().or(ctx.feature);

        let baseline = self.validate_once(ctx, scope);
        if baseline.budget_exhausted {
            return Err(WorkflowError::Timeout { mode });
        }
        if !baseline.success {
            let failed = baseline
                .last_report
                .as_ref()
                .map_or(1, |report| report.failed.max(1));
            warn!(%mode, failed, "baseline is not green");
            return Err(WorkflowError::BaselineNotGreen { mode, failed });
        }
        info!(%mode, scope = scope.unwrap_or("all"), "baseline green");

        let request = generation_request(state, ctx, mode, ctx.feature)?;
        let output = ctx.collaborators.generator.generate(&request).map_err(|err| {
            if ctx.deadline.is_exhausted() {
                WorkflowError::Timeout { mode }
            } else {
                WorkflowError::Internal(err.context(format!("{mode} generator failed")))
            }
        })?;

        let action = if ctx.options.analyze { "analyze" } else { mode.as_str() };
        let mut report = ModeReport::new(self.name, action, "");
        report.pending = output.pending.clone();

        if ctx.options.analyze {
            // Authorized but not written.
            let planned = plan_proposals(state, ctx, mode, &output.changes)?;
            report
                .pending
                .extend(planned.iter().map(|change| describe_planned(change.kind, &change.path)));
            report.summary = format!(
                "{} proposed, nothing written",
                plural(output.changes.len(), "change")
            );
            return Ok(report);
        }

        if output.changes.is_empty() {
            report.summary = "nothing to restructure".to_string();
            return Ok(report);
        }

        let snapshot = apply_proposals(state, ctx, mode, &output.changes)?;
        let post = self.validate_once(ctx, scope);
        if !post.success {
            snapshot
                .restore()
                .map_err(|err| WorkflowError::Internal(err.context("rollback after failed validation")))?;
            warn!(%mode, files = snapshot.paths().len(), "post-change validation failed; rolled back");
            if post.budget_exhausted {
                return Err(WorkflowError::Timeout { mode });
            }
            return Err(WorkflowError::ValidationFailure {
                attempts: post.attempts_used,
                reason: post
                    .last_failure_reason
                    .unwrap_or_else(|| "validation failed".to_string()),
            });
        }

        let files = snapshot.paths();
        info!(%mode, files = files.len(), "restructuring applied");
        report.summary = format!("restructured {} with the suite green", plural(files.len(), "file"));
        if let Some(id) = ctx.feature {
            let mut outcome = FeatureOutcome::new(id, Outcome::Succeeded, None);
            outcome.attempts = post.attempts_used;
            outcome.files = files;
            report.features.push(outcome);
        }
        Ok(report)
    }
}

fn describe_planned(kind: MutationKind, path: &Path) -> String {
    format!("{} {}", kind.as_str(), path.display())
}
