//! Persisted workflow data model.
//!
//! [`WorkflowState`] is a plain value: the dispatcher loads it, passes it through
//! a mode controller, and persists the result. Nothing global holds the active mode.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{FeatureStatus, Mode, ModeName, Outcome, TestResults};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowState {
    pub mode: Mode,
    pub started_at: Option<DateTime<Utc>>,
    pub current_feature: Option<String>,
    pub context: BTreeMap<String, String>,
    pub features: BTreeMap<String, FeatureRecord>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureRecord {
    pub status: FeatureStatus,
    pub created: Option<DateTime<Utc>>,
    pub steps_defined_at: Option<DateTime<Utc>>,
    pub implementation_started_at: Option<DateTime<Utc>>,
    pub test_results: TestResults,
    /// Cause of the most recent failure, cleared when the feature advances again.
    pub failure_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub mode: ModeName,
    pub action: String,
    pub feature_id: Option<String>,
    pub outcome: Outcome,
    pub reason: Option<String>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            started_at: None,
            current_feature: None,
            context: BTreeMap::new(),
            features: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

impl FeatureRecord {
    pub fn draft(now: DateTime<Utc>) -> Self {
        Self {
            status: FeatureStatus::Draft,
            created: Some(now),
            steps_defined_at: None,
            implementation_started_at: None,
            test_results: TestResults::default(),
            failure_reason: None,
        }
    }
}

impl WorkflowState {
    /// Hold `mode`. Re-entering the held mode keeps its start time.
    pub fn enter_mode(&mut self, mode: Mode, now: DateTime<Utc>) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.current_feature = None;
        self.started_at = (mode != Mode::Idle).then_some(now);
    }

    /// Release the held mode and clear in-progress fields.
    pub fn release_mode(&mut self) {
        self.mode = Mode::Idle;
        self.started_at = None;
        self.current_feature = None;
    }

    /// Clear the active mode while keeping features, context, and history.
    pub fn soft_reset(&mut self) {
        self.release_mode();
    }

    /// Drop all feature records and history. Specification documents are untouched.
    pub fn hard_reset(&mut self) {
        self.release_mode();
        self.features.clear();
        self.history.clear();
    }

    pub fn append_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn feature(&self, id: &str) -> Option<&FeatureRecord> {
        self.features.get(id)
    }

    pub fn feature_mut(&mut self, id: &str) -> Option<&mut FeatureRecord> {
        self.features.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{feature, state_with_features};

    #[test]
    fn enter_mode_sets_start_and_clears_focus() {
        let now = Utc::now();
        let mut state = WorkflowState {
            current_feature: Some("stale".to_string()),
            ..WorkflowState::default()
        };
        state.enter_mode(Mode::Steps, now);
        assert_eq!(state.mode, Mode::Steps);
        assert_eq!(state.started_at, Some(now));
        assert_eq!(state.current_feature, None);
    }

    #[test]
    fn reentering_held_mode_keeps_start_time() {
        let first = Utc::now();
        let mut state = WorkflowState::default();
        state.enter_mode(Mode::Implement, first);
        state.current_feature = Some("a".to_string());
        state.enter_mode(Mode::Implement, first + chrono::Duration::seconds(5));
        assert_eq!(state.started_at, Some(first));
        assert_eq!(state.current_feature.as_deref(), Some("a"));
    }

    #[test]
    fn soft_reset_keeps_features_and_history() {
        let mut state = state_with_features(&[
            ("a", FeatureStatus::Confirmed),
            ("b", FeatureStatus::Implementing),
        ]);
        state.enter_mode(Mode::Implement, Utc::now());
        state.append_history(crate::test_support::history_entry(ModeName::Implement));

        state.soft_reset();

        assert_eq!(state.mode, Mode::Idle);
        assert_eq!(state.started_at, None);
        assert_eq!(state.features.len(), 2);
        assert_eq!(state.history.len(), 1);
    }

    #[test]
    fn hard_reset_clears_features_and_history() {
        let mut state = state_with_features(&[("a", FeatureStatus::Completed)]);
        state.context.insert("platform".to_string(), "web".to_string());
        state.append_history(crate::test_support::history_entry(ModeName::Steps));

        state.hard_reset();

        assert!(state.features.is_empty());
        assert!(state.history.is_empty());
        assert_eq!(state.mode, Mode::Idle);
        assert_eq!(state.context.get("platform").map(String::as_str), Some("web"));
    }

    #[test]
    fn draft_record_has_creation_time_only() {
        let now = Utc::now();
        let record = FeatureRecord::draft(now);
        assert_eq!(record, FeatureRecord { created: Some(now), ..feature(FeatureStatus::Draft) });
    }
}
