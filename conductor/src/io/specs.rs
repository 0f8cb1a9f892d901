//! Specification-document collaborator.
//!
//! Documents are owned by humans and are authoritative over requirements. The
//! core only creates them, reads them, and appends status annotations.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::invariants::validate_feature_id;

pub const SPEC_EXTENSION: &str = "feature";
pub const ANNOTATION_PREFIX: &str = "# conductor:";

pub trait SpecDocuments {
    /// Workspace-relative path of the document for `feature_id`.
    fn path(&self, feature_id: &str) -> PathBuf;
    fn exists(&self, feature_id: &str) -> bool;
    /// Create the document. Fails if it already exists.
    fn create(&self, feature_id: &str, contents: &str) -> Result<PathBuf>;
    fn read(&self, feature_id: &str) -> Result<String>;
    /// Append a metadata line without touching the body.
    fn annotate(&self, feature_id: &str, note: &str) -> Result<()>;
    /// Feature ids with a document, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// Documents stored as `<spec_dir>/<feature_id>.feature` under the workspace root.
pub struct FileSpecDocuments {
    pub root: PathBuf,
    pub spec_dir: PathBuf,
}

impl FileSpecDocuments {
    fn absolute(&self, feature_id: &str) -> PathBuf {
        self.root.join(self.path(feature_id))
    }
}

impl SpecDocuments for FileSpecDocuments {
    fn path(&self, feature_id: &str) -> PathBuf {
        self.spec_dir
            .join(format!("{feature_id}.{SPEC_EXTENSION}"))
    }

    fn exists(&self, feature_id: &str) -> bool {
        self.absolute(feature_id).is_file()
    }

    fn create(&self, feature_id: &str, contents: &str) -> Result<PathBuf> {
        let path = self.absolute(feature_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("create specification {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("write specification {}", path.display()))?;
        debug!(path = %path.display(), "specification created");
        Ok(self.path(feature_id))
    }

    fn read(&self, feature_id: &str) -> Result<String> {
        let path = self.absolute(feature_id);
        fs::read_to_string(&path).with_context(|| format!("read specification {}", path.display()))
    }

    fn annotate(&self, feature_id: &str, note: &str) -> Result<()> {
        if note.contains('\n') {
            return Err(anyhow!("annotation must be a single line"));
        }
        let path = self.absolute(feature_id);
        let existing = fs::read_to_string(&path)
            .with_context(|| format!("read specification {}", path.display()))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("open specification {}", path.display()))?;
        let separator = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        writeln!(file, "{separator}{ANNOTATION_PREFIX} {note}")
            .with_context(|| format!("annotate specification {}", path.display()))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let dir = self.root.join(&self.spec_dir);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read dir {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some(SPEC_EXTENSION)
            {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|stem| stem.to_str())
                && validate_feature_id(id).is_ok()
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Body of a freshly created document when no requirements generator is configured.
pub fn placeholder(feature_id: &str) -> String {
    format!("# {feature_id}\n\n# Describe the expected behavior of this feature here.\n")
}

/// Document content without conductor annotations.
pub fn body(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim_start().starts_with(ANNOTATION_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}
