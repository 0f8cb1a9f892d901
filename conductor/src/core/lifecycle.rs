//! Feature lifecycle transitions and progression invariants.
//!
//! Statuses only move forward one edge at a time or jump to `failed`. The only
//! backward edges are the explicit re-opens used by `implement --retry` and
//! `implement --force`.

use std::collections::BTreeMap;

use crate::core::types::FeatureStatus;
use crate::workflow::FeatureRecord;

/// A requested lifecycle edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Human confirmation of a draft specification.
    Confirm,
    DefineSteps,
    /// Enter `implementing`; also resumes an interrupted implementation.
    StartImplementation,
    Complete,
    Fail,
    /// `implement --retry`: failed -> implementing.
    Retry,
    /// `implement --force`: any terminal status -> implementing.
    Reopen,
}

/// Apply `transition` to `status`, returning the next status or a stable error message.
pub fn apply_transition(status: FeatureStatus, transition: Transition) -> Result<FeatureStatus, String> {
    use FeatureStatus as S;

    let next = match (status, transition) {
        (S::Draft, Transition::Confirm) => S::Confirmed,
        (S::Confirmed, Transition::DefineSteps) => S::StepsDefined,
        (S::StepsDefined | S::Implementing, Transition::StartImplementation) => S::Implementing,
        (S::Implementing, Transition::Complete) => S::Completed,
        (S::Implementing, Transition::Fail) => S::Failed,
        (S::Failed, Transition::Retry) => S::Implementing,
        (S::Completed | S::Failed, Transition::Reopen) => S::Implementing,
        _ => {
            return Err(format!(
                "cannot apply {} to a feature in status '{}'",
                transition_label(transition),
                status
            ));
        }
    };
    Ok(next)
}

/// True if moving from `prev` to `next` is allowed without an explicit re-open.
pub fn is_forward(prev: FeatureStatus, next: FeatureStatus) -> bool {
    prev == next || next == FeatureStatus::Failed || next.rank() > prev.rank()
}

/// Which backward edges a run was allowed to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReopenPolicy {
    pub retry: bool,
    pub force: bool,
}

/// Validate status progression between two snapshots of the feature map.
///
/// Records missing from `next` are reported: only a hard reset deletes records,
/// and it does not go through this check. Returns stable messages sorted by id.
pub fn check_status_progression(
    prev: &BTreeMap<String, FeatureRecord>,
    next: &BTreeMap<String, FeatureRecord>,
    reopen: ReopenPolicy,
) -> Vec<String> {
    let mut errors = Vec::new();
    for (id, before) in prev {
        let Some(after) = next.get(id) else {
            errors.push(format!("feature '{id}' disappeared"));
            continue;
        };
        if is_forward(before.status, after.status) {
            continue;
        }
        // A re-opened feature may finish again within the same run.
        let reopened = after.status.rank() >= FeatureStatus::Implementing.rank()
            && ((reopen.retry && before.status == FeatureStatus::Failed)
                || (reopen.force && before.status.is_terminal()));
        if !reopened {
            errors.push(format!(
                "feature '{id}' regressed from '{}' to '{}'",
                before.status, after.status
            ));
        }
    }
    errors
}

/// Validate that no feature status changed at all (refactor and step optimization).
pub fn check_statuses_unchanged(
    prev: &BTreeMap<String, FeatureRecord>,
    next: &BTreeMap<String, FeatureRecord>,
) -> Vec<String> {
    let mut errors = Vec::new();
    for (id, before) in prev {
        match next.get(id) {
            None => errors.push(format!("feature '{id}' disappeared")),
            Some(after) if after.status != before.status => errors.push(format!(
                "feature '{id}' status changed from '{}' to '{}'",
                before.status, after.status
            )),
            Some(_) => {}
        }
    }
    for id in next.keys().filter(|id| !prev.contains_key(*id)) {
        errors.push(format!("feature '{id}' appeared"));
    }
    errors
}

fn transition_label(transition: Transition) -> &'static str {
    match transition {
        Transition::Confirm => "confirm",
        Transition::DefineSteps => "define-steps",
        Transition::StartImplementation => "start-implementation",
        Transition::Complete => "complete",
        Transition::Fail => "fail",
        Transition::Retry => "retry",
        Transition::Reopen => "reopen",
    }
}
