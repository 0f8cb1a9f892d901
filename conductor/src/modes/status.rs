//! `status` pseudo-mode: read-only projection of the workflow state.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::registry::{FeatureCounts, FeatureRegistry};
use crate::core::types::{FeatureStatus, Mode, ModeName};
use crate::error::WorkflowError;
use crate::workflow::WorkflowState;

use super::{ModeContext, ModeController, ModeReport, plural};

/// Deterministic status snapshot. Carries no timestamps so repeated queries
/// over an unchanged state render identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub mode: Mode,
    pub current_feature: Option<String>,
    pub context: BTreeMap<String, String>,
    pub counts: FeatureCounts,
    pub next: Vec<String>,
    pub features: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureRow {
    pub id: String,
    pub status: FeatureStatus,
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
    pub failure_reason: Option<String>,
}

impl StatusView {
    pub fn of(state: &WorkflowState, include_failed: bool) -> Self {
        let registry = FeatureRegistry::new(state);
        Self {
            mode: state.mode,
            current_feature: state.current_feature.clone(),
            context: state.context.clone(),
            counts: registry.counts(),
            next: registry
                .next(include_failed)
                .into_iter()
                .map(str::to_string)
                .collect(),
            features: state
                .features
                .iter()
                .map(|(id, record)| FeatureRow {
                    id: id.clone(),
                    status: record.status,
                    passed: record.test_results.passed,
                    failed: record.test_results.failed,
                    pending: record.test_results.pending,
                    failure_reason: record.failure_reason.clone(),
                })
                .collect(),
        }
    }
}

pub struct StatusMode;

impl ModeController for StatusMode {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError> {
        let view = StatusView::of(state, ctx.options.retry || ctx.options.force);
        let counts = view.counts;
        let summary = format!(
            "{} in mode {}: {} completed, {} failed, {} pending",
            plural(counts.total, "feature"),
            view.mode,
            counts.completed,
            counts.failed,
            view.next.len()
        );
        let mut report = ModeReport::new(ModeName::Status, "status", summary);
        report.status = Some(view);
        Ok(report)
    }
}
