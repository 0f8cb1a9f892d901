//! Semantic invariants not expressible via JSON Schema.

use crate::core::types::{FeatureStatus, Mode};
use crate::workflow::WorkflowState;

/// Check semantic invariants of a loaded state:
/// - `idle` holds no start time and no focused feature
/// - a focused feature exists in `features`
/// - feature ids are valid ids
/// - features past `confirmed` that recorded step authoring keep the timestamp order
pub fn validate_invariants(state: &WorkflowState) -> Vec<String> {
    let mut errors = Vec::new();

    if state.mode == Mode::Idle {
        if state.started_at.is_some() {
            errors.push("idle state must not have started_at".to_string());
        }
        if state.current_feature.is_some() {
            errors.push("idle state must not have current_feature".to_string());
        }
    }

    if let Some(current) = &state.current_feature
        && !state.features.contains_key(current)
    {
        errors.push(format!("current_feature '{current}' is not a known feature"));
    }

    for (id, record) in &state.features {
        if let Err(err) = validate_feature_id(id) {
            errors.push(err);
        }
        if let (Some(steps), Some(implementation)) =
            (record.steps_defined_at, record.implementation_started_at)
            && implementation < steps
        {
            errors.push(format!(
                "feature '{id}': implementation_started_at precedes steps_defined_at"
            ));
        }
        if record.status == FeatureStatus::Draft
            && (record.steps_defined_at.is_some() || record.implementation_started_at.is_some())
        {
            errors.push(format!("feature '{id}': draft feature has lifecycle timestamps"));
        }
    }

    errors
}

/// Feature ids are `[A-Za-z0-9._-]`, non-empty, and never a path.
pub fn validate_feature_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("feature id must not be empty".to_string());
    }
    if id.contains('/') {
        return Err(format!("feature id must not contain '/' (got '{id}')"));
    }
    if id == "." || id == ".." {
        return Err(format!("feature id must not be '{id}'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(format!("feature id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}
