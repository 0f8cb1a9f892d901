//! Read-only feature registry over [`WorkflowState::features`].

use serde::Serialize;

use crate::core::types::FeatureStatus;
use crate::workflow::{FeatureRecord, WorkflowState};

/// Aggregate counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeatureCounts {
    pub total: usize,
    pub draft: usize,
    pub confirmed: usize,
    pub steps_defined: usize,
    pub implementing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl FeatureCounts {
    pub fn of(&self, status: FeatureStatus) -> usize {
        match status {
            FeatureStatus::Draft => self.draft,
            FeatureStatus::Confirmed => self.confirmed,
            FeatureStatus::StepsDefined => self.steps_defined,
            FeatureStatus::Implementing => self.implementing,
            FeatureStatus::Completed => self.completed,
            FeatureStatus::Failed => self.failed,
        }
    }
}

/// Borrowing view keyed by feature id. Never mutates state.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRegistry<'a> {
    state: &'a WorkflowState,
}

impl<'a> FeatureRegistry<'a> {
    pub fn new(state: &'a WorkflowState) -> Self {
        Self { state }
    }

    pub fn get(&self, id: &str) -> Option<&'a FeatureRecord> {
        self.state.features.get(id)
    }

    /// Ids with exactly `status`, in id order.
    pub fn pending(&self, status: FeatureStatus) -> Vec<&'a str> {
        self.state
            .features
            .iter()
            .filter(|(_, record)| record.status == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn counts(&self) -> FeatureCounts {
        let mut counts = FeatureCounts::default();
        for record in self.state.features.values() {
            counts.total += 1;
            match record.status {
                FeatureStatus::Draft => counts.draft += 1,
                FeatureStatus::Confirmed => counts.confirmed += 1,
                FeatureStatus::StepsDefined => counts.steps_defined += 1,
                FeatureStatus::Implementing => counts.implementing += 1,
                FeatureStatus::Completed => counts.completed += 1,
                FeatureStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Priority-ordered pending work.
    ///
    /// Lifecycle order first (draft, confirmed, steps_defined, implementing), ties
    /// broken by id. Completed features never appear. Failed features are excluded
    /// unless `include_failed`, and then they come last.
    pub fn next(&self, include_failed: bool) -> Vec<&'a str> {
        let mut ordered: Vec<(&FeatureRecord, &str)> = self
            .state
            .features
            .iter()
            .filter(|(_, record)| match record.status {
                FeatureStatus::Completed => false,
                FeatureStatus::Failed => include_failed,
                _ => true,
            })
            .map(|(id, record)| (record, id.as_str()))
            .collect();
        ordered.sort_by(|(a, a_id), (b, b_id)| {
            priority(a.status)
                .cmp(&priority(b.status))
                .then_with(|| a_id.cmp(b_id))
        });
        ordered.into_iter().map(|(_, id)| id).collect()
    }
}

fn priority(status: FeatureStatus) -> u8 {
    match status {
        FeatureStatus::Draft => 0,
        FeatureStatus::Confirmed => 1,
        FeatureStatus::StepsDefined => 2,
        FeatureStatus::Implementing => 3,
        FeatureStatus::Failed => 4,
        FeatureStatus::Completed => 5,
    }
}
