//! Authorized application of proposed artifact changes.
//!
//! A batch is classified and checked against the role/artifact matrix before
//! anything is written. Writes are atomic per file, and the pre-write content
//! of every touched file is kept so the batch can be rolled back.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::classifier::{ArtifactLayout, classify_path};
use crate::core::constraints::{MutationRequest, check_mutations};
use crate::core::types::{ArtifactClass, Mode, MutationKind};
use crate::error::WorkflowError;
use crate::io::generator::ProposedChange;
use crate::io::paths::write_atomic;
use crate::io::specs::SPEC_EXTENSION;
use crate::workflow::FeatureRecord;

/// A change that passed authorization and is ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    /// Workspace-relative path.
    pub path: PathBuf,
    pub class: ArtifactClass,
    pub kind: MutationKind,
    pub contents: Option<String>,
}

/// Inputs for authorizing one batch of proposals.
#[derive(Debug, Clone, Copy)]
pub struct ChangePolicy<'a> {
    pub root: &'a Path,
    pub layout: &'a ArtifactLayout,
    pub mode: Mode,
    pub features: &'a BTreeMap<String, FeatureRecord>,
    pub human_override: bool,
}

/// Classify and authorize every proposal. Any denial rejects the whole batch.
pub fn plan_changes(
    policy: &ChangePolicy<'_>,
    changes: &[ProposedChange],
) -> Result<Vec<PlannedChange>, WorkflowError> {
    let mut seen = BTreeSet::new();
    let mut planned = Vec::with_capacity(changes.len());
    for change in changes {
        if !seen.insert(change.path.clone()) {
            return Err(WorkflowError::InvalidInput(format!(
                "{} proposed more than once in one batch",
                change.path.display()
            )));
        }
        let class = classify_path(policy.layout, &change.path);
        let exists = policy.root.join(&change.path).is_file();
        let kind = if change.delete {
            if !exists && class != ArtifactClass::Unclassified {
                return Err(WorkflowError::MissingArtifact(format!(
                    "cannot delete {}: no such file",
                    change.path.display()
                )));
            }
            MutationKind::Delete
        } else if exists {
            MutationKind::Modify
        } else {
            MutationKind::Create
        };
        planned.push(PlannedChange {
            path: change.path.clone(),
            class,
            kind,
            contents: change.contents.clone(),
        });
    }

    let requests: Vec<MutationRequest<'_>> = planned
        .iter()
        .map(|change| MutationRequest {
            mode: policy.mode,
            path: &change.path,
            class: change.class,
            kind: change.kind,
            feature_status: spec_owner(policy.layout, change)
                .and_then(|id| policy.features.get(id))
                .map(|record| record.status),
            human_override: policy.human_override,
        })
        .collect();
    let violations = check_mutations(&requests);
    if !violations.is_empty() {
        warn!(mode = %policy.mode, denied = violations.len(), "artifact batch rejected");
        return Err(WorkflowError::ConstraintViolation(violations));
    }
    Ok(planned)
}

/// Feature id owning a specification document path (`<spec_dir>/<id>.feature`).
fn spec_owner<'c>(layout: &ArtifactLayout, change: &'c PlannedChange) -> Option<&'c str> {
    if change.class != ArtifactClass::SpecificationDocument {
        return None;
    }
    if change.path.parent() != Some(layout.spec_dir.as_path())
        || change.path.extension().and_then(|ext| ext.to_str()) != Some(SPEC_EXTENSION)
    {
        return None;
    }
    change.path.file_stem().and_then(|stem| stem.to_str())
}

/// Pre-write content of a set of files. `None` means the file did not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    root: PathBuf,
    files: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl Snapshot {
    pub fn capture(root: &Path, paths: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for relative in paths {
            let path = root.join(relative);
            let contents = if path.is_file() {
                Some(fs::read(&path).with_context(|| format!("snapshot {}", path.display()))?)
            } else {
                None
            };
            files.push((relative.clone(), contents));
        }
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// Workspace-relative paths covered by this snapshot.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Put every file back the way it was at capture time.
    pub fn restore(&self) -> Result<()> {
        for (relative, contents) in &self.files {
            let path = self.root.join(relative);
            match contents {
                Some(bytes) => write_atomic(&path, bytes)?,
                None if path.exists() => fs::remove_file(&path)
                    .with_context(|| format!("remove {}", path.display()))?,
                None => {}
            }
        }
        info!(files = self.files.len(), "artifacts rolled back");
        Ok(())
    }
}

/// Apply an authorized batch. On a mid-batch failure the files already written
/// are restored before the error is returned.
pub fn apply_changes(root: &Path, planned: &[PlannedChange]) -> Result<Snapshot> {
    let paths: Vec<PathBuf> = planned.iter().map(|change| change.path.clone()).collect();
    let snapshot = Snapshot::capture(root, &paths)?;
    if let Err(err) = write_all(root, planned) {
        warn!(err = %err, "artifact write failed; rolling back batch");
        snapshot
            .restore()
            .context("roll back partially applied batch")?;
        return Err(err);
    }
    Ok(snapshot)
}

fn write_all(root: &Path, planned: &[PlannedChange]) -> Result<()> {
    for change in planned {
        let path = root.join(&change.path);
        match (&change.kind, &change.contents) {
            (MutationKind::Delete, _) => {
                fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))?;
            }
            (_, Some(contents)) => write_atomic(&path, contents.as_bytes())?,
            (_, None) => {}
        }
        debug!(path = %change.path.display(), kind = change.kind.as_str(), "artifact written");
    }
    Ok(())
}

/// Workspace-relative files under `classes`' directories, sorted.
pub fn list_artifacts(
    root: &Path,
    layout: &ArtifactLayout,
    classes: &[ArtifactClass],
) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for class in classes {
        for dir in layout.dirs_for(*class) {
            collect_files(root, &root.join(dir), &mut found)?;
        }
    }
    Ok(found
        .into_iter()
        .filter(|path| classes.contains(&classify_path(layout, path)))
        .collect())
}

fn collect_files(root: &Path, dir: &Path, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, found)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            found.insert(relative.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FeatureStatus;
    use crate::test_support::state_with_features;

    fn policy<'a>(
        root: &'a Path,
        layout: &'a ArtifactLayout,
        mode: Mode,
        features: &'a BTreeMap<String, FeatureRecord>,
    ) -> ChangePolicy<'a> {
        ChangePolicy {
            root,
            layout,
            mode,
            features,
            human_override: false,
        }
    }

    #[test]
    fn plan_distinguishes_create_modify_delete() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("src/a.rs"), "old").expect("write");
        fs::write(root.join("src/b.rs"), "old").expect("write");
        let layout = ArtifactLayout::default();
        let features = BTreeMap::new();

        let planned = plan_changes(
            &policy(root, &layout, Mode::Refactor, &features),
            &[
                ProposedChange::write("src/a.rs", "new"),
                ProposedChange::write("src/c.rs", "new"),
                ProposedChange::remove("src/b.rs"),
            ],
        )
        .expect("plan");
        let kinds: Vec<MutationKind> = planned.iter().map(|change| change.kind).collect();
        assert_eq!(
            kinds,
            vec![MutationKind::Modify, MutationKind::Create, MutationKind::Delete]
        );
    }

    /// One denied change rejects the batch and nothing is written.
    #[test]
    fn denied_change_rejects_whole_batch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let layout = ArtifactLayout::default();
        let features = BTreeMap::new();

        let err = plan_changes(
            &policy(root, &layout, Mode::Implement, &features),
            &[
                ProposedChange::write("src/login.rs", "fn login() {}"),
                ProposedChange::write("features/step_definitions/login.rs", "steps"),
            ],
        )
        .unwrap_err();

        match err {
            WorkflowError::ConstraintViolation(reasons) => {
                assert_eq!(reasons.len(), 1);
                assert!(reasons[0].starts_with("features/step_definitions/login.rs: implement may not"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.join("src/login.rs").exists());
    }

    #[test]
    fn confirmed_spec_body_needs_override() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("features")).expect("mkdir");
        fs::write(root.join("features/login.feature"), "Feature: Login").expect("write");
        let layout = ArtifactLayout::default();
        let state = state_with_features(&[("login", FeatureStatus::Confirmed)]);
        let changes = [ProposedChange::write("features/login.feature", "Feature: Login v2")];

        let err = plan_changes(
            &policy(root, &layout, Mode::Requirements, &state.features),
            &changes,
        )
        .unwrap_err();
        assert!(err.to_string().contains("human override"));

        let overridden = ChangePolicy {
            human_override: true,
            ..policy(root, &layout, Mode::Requirements, &state.features)
        };
        let planned = plan_changes(&overridden, &changes).expect("plan with override");
        assert_eq!(planned[0].kind, MutationKind::Modify);
    }

    #[test]
    fn duplicate_paths_are_invalid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let layout = ArtifactLayout::default();
        let features = BTreeMap::new();
        let err = plan_changes(
            &policy(temp.path(), &layout, Mode::Implement, &features),
            &[
                ProposedChange::write("src/a.rs", "1"),
                ProposedChange::write("src/a.rs", "2"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidInput(_)));
    }

    #[test]
    fn snapshot_restores_modified_and_created_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("src/a.rs"), "original").expect("write");
        fs::write(root.join("src/gone.rs"), "keep me").expect("write");

        let planned = vec![
            PlannedChange {
                path: PathBuf::from("src/a.rs"),
                class: ArtifactClass::BusinessLogic,
                kind: MutationKind::Modify,
                contents: Some("changed".to_string()),
            },
            PlannedChange {
                path: PathBuf::from("src/new.rs"),
                class: ArtifactClass::BusinessLogic,
                kind: MutationKind::Create,
                contents: Some("fresh".to_string()),
            },
            PlannedChange {
                path: PathBuf::from("src/gone.rs"),
                class: ArtifactClass::BusinessLogic,
                kind: MutationKind::Delete,
                contents: None,
            },
        ];
        let snapshot = apply_changes(root, &planned).expect("apply");
        assert_eq!(fs::read_to_string(root.join("src/a.rs")).expect("read"), "changed");
        assert!(!root.join("src/gone.rs").exists());

        snapshot.restore().expect("restore");
        assert_eq!(fs::read_to_string(root.join("src/a.rs")).expect("read"), "original");
        assert!(!root.join("src/new.rs").exists());
        assert_eq!(fs::read_to_string(root.join("src/gone.rs")).expect("read"), "keep me");
    }

    #[test]
    fn list_artifacts_filters_by_class() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        for path in [
            "features/login.feature",
            "features/step_definitions/login_steps.rs",
            "features/support/world.rs",
            "src/lib.rs",
        ] {
            let full = root.join(path);
            fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
            fs::write(full, "").expect("write");
        }
        let layout = ArtifactLayout::default();

        let steps = list_artifacts(root, &layout, &[ArtifactClass::StepDefinition]).expect("list");
        assert_eq!(steps, vec![PathBuf::from("features/step_definitions/login_steps.rs")]);

        let specs =
            list_artifacts(root, &layout, &[ArtifactClass::SpecificationDocument]).expect("list");
        assert_eq!(specs, vec![PathBuf::from("features/login.feature")]);
    }
}
