//! Deterministic classification of artifact paths.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::types::ArtifactClass;

/// Workspace-relative directories that own each artifact class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactLayout {
    pub spec_dir: PathBuf,
    pub step_dir: PathBuf,
    pub page_object_dir: PathBuf,
    pub helper_dir: PathBuf,
    pub business_logic_dirs: Vec<PathBuf>,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            spec_dir: PathBuf::from("features"),
            step_dir: PathBuf::from("features/step_definitions"),
            page_object_dir: PathBuf::from("features/pages"),
            helper_dir: PathBuf::from("features/support"),
            business_logic_dirs: vec![PathBuf::from("src")],
        }
    }
}

impl ArtifactLayout {
    /// All `(dir, class)` pairs, used for longest-prefix matching.
    pub fn entries(&self) -> Vec<(&Path, ArtifactClass)> {
        let mut entries = vec![
            (self.spec_dir.as_path(), ArtifactClass::SpecificationDocument),
            (self.step_dir.as_path(), ArtifactClass::StepDefinition),
            (self.page_object_dir.as_path(), ArtifactClass::PageObject),
            (self.helper_dir.as_path(), ArtifactClass::Helper),
        ];
        for dir in &self.business_logic_dirs {
            entries.push((dir.as_path(), ArtifactClass::BusinessLogic));
        }
        entries
    }

    /// Directories owned by `class`.
    pub fn dirs_for(&self, class: ArtifactClass) -> Vec<&Path> {
        self.entries()
            .into_iter()
            .filter(|(_, owner)| *owner == class)
            .map(|(dir, _)| dir)
            .collect()
    }

    /// Every layout directory must be relative and free of `..`.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (dir, class) in self.entries() {
            if normalize(dir).is_none() || dir.as_os_str().is_empty() {
                errors.push(format!(
                    "layout dir for {class} must be a non-empty relative path (got '{}')",
                    dir.display()
                ));
            }
        }
        errors
    }
}

/// Classify a workspace-relative path by the longest matching layout directory.
///
/// Specification documents live directly under `spec_dir` (nested step,
/// page-object, and helper dirs win by length). Absolute paths and paths that
/// escape the workspace are `Unclassified`.
pub fn classify_path(layout: &ArtifactLayout, path: &Path) -> ArtifactClass {
    let Some(path) = normalize(path) else {
        return ArtifactClass::Unclassified;
    };

    let mut best: Option<(usize, ArtifactClass)> = None;
    for (dir, class) in layout.entries() {
        let Some(dir) = normalize(dir) else {
            continue;
        };
        if dir.is_empty() || !path.starts_with(&dir) || path.len() == dir.len() {
            continue;
        }
        if best.is_none_or(|(len, _)| dir.len() > len) {
            best = Some((dir.len(), class));
        }
    }
    best.map_or(ArtifactClass::Unclassified, |(_, class)| class)
}

/// Split a relative path into normal components, rejecting absolute or escaping paths.
fn normalize(path: &Path) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}
