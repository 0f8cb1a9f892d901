//! Artifact-generation collaborator.
//!
//! The [`ArtifactGenerator`] trait decouples mode controllers from whatever
//! produces artifacts. Generators never write files: they return proposed
//! changes, which the core authorizes and applies. Tests use scripted
//! generators that return predetermined proposals.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::Mode;
use crate::io::config::GeneratorConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// What the generator is asked to do. Serialized as JSON on the command's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub mode: Mode,
    pub feature_id: Option<String>,
    /// Specification document content for the feature, when one exists.
    pub specification: Option<String>,
    /// Workspace-relative paths of artifacts this mode may touch.
    pub existing: Vec<PathBuf>,
    /// Free-form directives such as `merge`, `generalize`, `analyze`.
    pub directives: Vec<String>,
    pub scope: Option<String>,
    pub context: BTreeMap<String, String>,
    #[serde(skip)]
    pub timeout: Duration,
}

/// One proposed artifact change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    /// Workspace-relative path.
    pub path: PathBuf,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub delete: bool,
}

impl ProposedChange {
    pub fn write(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: Some(contents.into()),
            delete: false,
        }
    }

    pub fn remove(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: None,
            delete: true,
        }
    }
}

/// Generator result: proposed changes plus items left for a human.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    #[serde(default)]
    pub changes: Vec<ProposedChange>,
    #[serde(default)]
    pub pending: Vec<String>,
}

impl GenerationOutput {
    /// Each change must either carry contents or delete, never both.
    pub fn validate(&self) -> Result<()> {
        for change in &self.changes {
            match (&change.contents, change.delete) {
                (Some(_), false) | (None, true) => {}
                (Some(_), true) => {
                    return Err(anyhow!(
                        "change for {} has both contents and delete",
                        change.path.display()
                    ));
                }
                (None, false) => {
                    return Err(anyhow!(
                        "change for {} has neither contents nor delete",
                        change.path.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Abstraction over artifact generation backends.
pub trait ArtifactGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput>;
}

/// Generator used when no command is configured for a mode: artifacts are
/// authored by hand, so nothing is proposed.
pub struct ManualGenerator;

impl ArtifactGenerator for ManualGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        debug!(mode = %request.mode, feature = ?request.feature_id, "no generator configured; expecting hand-authored artifacts");
        Ok(GenerationOutput::default())
    }
}

/// Generator that spawns a configured command, writes the request JSON to its
/// stdin, and reads [`GenerationOutput`] JSON from its stdout.
pub struct CommandGenerator {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub output_limit_bytes: usize,
}

impl ArtifactGenerator for CommandGenerator {
    #[instrument(skip_all, fields(mode = %request.mode, feature = ?request.feature_id))]
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        info!(command = ?self.command, "running generator");
        let input = serde_json::to_vec(request).context("serialize generation request")?;
        let cmd = command_from_argv(&self.command, &self.workdir)?;
        let output =
            run_command_with_timeout(cmd, Some(&input), request.timeout, self.output_limit_bytes)
                .context("run generator command")?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        if output.stdout.dropped > 0 {
            return Err(anyhow!(
                "generator output exceeded {} bytes",
                self.output_limit_bytes
            ));
        }
        let parsed: GenerationOutput =
            serde_json::from_slice(&output.stdout.bytes).context("parse generator output")?;
        parsed.validate()?;
        debug!(changes = parsed.changes.len(), pending = parsed.pending.len(), "generator finished");
        Ok(parsed)
    }
}

/// Routes each request to the command configured for its mode, falling back
/// to [`ManualGenerator`].
pub struct ConfiguredGenerator {
    pub config: GeneratorConfig,
    pub workdir: PathBuf,
    pub output_limit_bytes: usize,
}

impl ArtifactGenerator for ConfiguredGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        match self.config.command_for(request.mode) {
            Some(argv) => CommandGenerator {
                command: argv.to_vec(),
                workdir: self.workdir.clone(),
                output_limit_bytes: self.output_limit_bytes,
            }
            .generate(request),
            None => ManualGenerator.generate(request),
        }
    }
}
