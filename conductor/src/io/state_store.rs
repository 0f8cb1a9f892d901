//! Workflow state load/save with schema + invariant validation, and the
//! advisory lock serializing dispatcher invocations.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::invariants::validate_invariants;
use crate::io::paths::{WorkspacePaths, write_atomic};
use crate::workflow::WorkflowState;

pub const STATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/workflow_state/v1.schema.json"
));

/// Reads and writes `.conductor/state.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(paths: &WorkspacePaths) -> Self {
        Self {
            path: paths.state_path.clone(),
        }
    }

    /// Load the stored state, or a fresh idle state when none exists yet.
    pub fn load_or_default(&self) -> Result<WorkflowState> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no workflow state yet; starting idle");
            return Ok(WorkflowState::default());
        }
        load_state(&self.path)
    }

    pub fn save(&self, state: &WorkflowState) -> Result<()> {
        write_state(&self.path, state)
    }
}

/// Load and validate state from disk (schema + invariants).
pub fn load_state(path: &Path) -> Result<WorkflowState> {
    debug!(path = %path.display(), "loading workflow state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate state {}", path.display()))?;
    let state: WorkflowState = serde_json::from_value(value)
        .with_context(|| format!("deserialize state {}", path.display()))?;
    let errors = validate_invariants(&state);
    if !errors.is_empty() {
        return Err(anyhow!(
            "state invariants failed for {}: {}",
            path.display(),
            errors.join("; ")
        ));
    }
    debug!(mode = %state.mode, features = state.features.len(), history = state.history.len(), "workflow state loaded");
    Ok(state)
}

/// Atomically write state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &WorkflowState) -> Result<()> {
    debug!(path = %path.display(), mode = %state.mode, history = state.history.len(), "writing workflow state");
    let mut buf = serde_json::to_string_pretty(state).context("serialize workflow state")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(STATE_SCHEMA).context("parse state schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "state schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

/// Exclusive advisory lock on `.conductor/state.lock`, held for one dispatcher
/// invocation and released when dropped.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock is held.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        #[allow(clippy::suspicious_open_options)]
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("acquire exclusive lock {}", path.display()))?;
        debug!(path = %path.display(), "state lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), err = %err, "failed to release state lock");
        } else {
            debug!(path = %self.path.display(), "state lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FeatureStatus, Mode, ModeName};
    use crate::test_support::{history_entry, state_with_features};
    use chrono::Utc;

    fn store(root: &Path) -> StateStore {
        StateStore::new(&WorkspacePaths::new(root))
    }

    /// Verifies write then load preserves every field through schema validation.
    #[test]
    fn state_round_trips_through_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());

        let mut state = state_with_features(&[
            ("login", FeatureStatus::StepsDefined),
            ("signup", FeatureStatus::Failed),
        ]);
        state.enter_mode(Mode::Implement, Utc::now());
        state.current_feature = Some("login".to_string());
        state.context.insert("platform".to_string(), "web".to_string());
        state.append_history(history_entry(ModeName::Implement));

        store.save(&state).expect("save");
        let loaded = store.load_or_default().expect("load");
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_state_loads_idle_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let loaded = store(temp.path()).load_or_default().expect("load");
        assert_eq!(loaded, WorkflowState::default());
    }

    /// Ensures the default state serializes to a known, stable JSON layout.
    #[test]
    fn default_state_is_deterministic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        write_state(&path, &WorkflowState::default()).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        let expected = "{\n  \"mode\": \"idle\",\n  \"started_at\": null,\n  \"current_feature\": null,\n  \"context\": {},\n  \"features\": {},\n  \"history\": []\n}\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn schema_rejects_unknown_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        let mut state = state_with_features(&[("login", FeatureStatus::Draft)]);
        state.current_feature = None;
        write_state(&path, &state).expect("write");
        let contents = fs::read_to_string(&path)
            .expect("read")
            .replace("\"draft\"", "\"shipped\"");
        fs::write(&path, contents).expect("rewrite");

        let err = load_state(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn invariants_are_checked_on_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        let state = WorkflowState {
            current_feature: Some("ghost".to_string()),
            ..WorkflowState::default()
        };
        write_state(&path, &state).expect("write");

        let err = load_state(&path).unwrap_err();
        assert!(err.to_string().contains("state invariants failed"));
    }

    /// A held lock excludes a second handle until dropped.
    #[test]
    fn lock_is_exclusive_until_dropped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".conductor/state.lock");

        let lock = StateLock::acquire(&path).expect("acquire");
        let other = OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("open second handle");
        assert!(other.try_lock_exclusive().is_err());

        drop(lock);
        other.try_lock_exclusive().expect("lock after release");
    }
}
