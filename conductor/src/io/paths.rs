//! Canonical paths within `.conductor/` for a workspace root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

pub const CONDUCTOR_DIR: &str = ".conductor";

/// All canonical paths within `.conductor/` for a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub conductor_dir: PathBuf,
    pub state_path: PathBuf,
    pub lock_path: PathBuf,
    pub config_path: PathBuf,
    pub reports_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let conductor_dir = root.join(CONDUCTOR_DIR);
        Self {
            root: root.clone(),
            conductor_dir: conductor_dir.clone(),
            state_path: conductor_dir.join("state.json"),
            lock_path: conductor_dir.join("state.lock"),
            config_path: conductor_dir.join("config.toml"),
            reports_dir: conductor_dir.join("reports"),
            gitignore_path: conductor_dir.join(".gitignore"),
        }
    }
}

/// Create `.conductor/` on first use. Idempotent.
pub fn ensure_layout(paths: &WorkspacePaths) -> Result<()> {
    if paths.conductor_dir.exists() && !paths.conductor_dir.is_dir() {
        return Err(anyhow!(
            "{} exists but is not a directory",
            paths.conductor_dir.display()
        ));
    }
    fs::create_dir_all(&paths.reports_dir)
        .with_context(|| format!("create directory {}", paths.reports_dir.display()))?;
    if !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, CONDUCTOR_GITIGNORE)
            .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    }
    Ok(())
}

/// Atomically replace `path` with `contents` (temp file + rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

const CONDUCTOR_GITIGNORE: &str = "state.lock\n*.tmp\n";
