//! Conductor configuration stored under `.conductor/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::ArtifactLayout;
use crate::core::types::{FailureClass, Mode};
use crate::io::paths::write_atomic;

pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Conductor configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults, and a
/// missing file is the same as an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConductorConfig {
    /// Validation attempts per feature in implement mode.
    pub max_attempts: u32,

    /// Wall-clock budget for one mode invocation, in seconds.
    pub mode_timeout_secs: u64,

    /// Bytes of collaborator stdout/stderr kept in memory.
    pub command_output_limit_bytes: usize,

    pub validation: ValidationConfig,
    pub generators: GeneratorConfig,
    pub autofix: AutoFixConfig,
    pub layout: ArtifactLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Command running the validation suite (e.g. `["just","test"]`).
    pub command: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            command: vec!["just".to_string(), "test".to_string()],
        }
    }
}

/// Optional artifact generator command per mode. Unset means artifacts are
/// authored by hand and the mode only validates and records progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub requirements: Option<Vec<String>>,
    pub steps: Option<Vec<String>>,
    pub implement: Option<Vec<String>>,
    pub refactor: Option<Vec<String>>,
    pub step_optimize: Option<Vec<String>>,
}

impl GeneratorConfig {
    pub fn command_for(&self, mode: Mode) -> Option<&[String]> {
        let command = match mode {
            Mode::Idle => None,
            Mode::Requirements => self.requirements.as_ref(),
            Mode::Steps => self.steps.as_ref(),
            Mode::Implement => self.implement.as_ref(),
            Mode::Refactor => self.refactor.as_ref(),
            Mode::StepOptimize => self.step_optimize.as_ref(),
        };
        command.map(Vec::as_slice)
    }

    fn entries(&self) -> [(&'static str, Option<&Vec<String>>); 5] {
        [
            ("requirements", self.requirements.as_ref()),
            ("steps", self.steps.as_ref()),
            ("implement", self.implement.as_ref()),
            ("refactor", self.refactor.as_ref()),
            ("step_optimize", self.step_optimize.as_ref()),
        ]
    }
}

/// Optional auto-fix command per recoverable failure class.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoFixConfig {
    pub missing_dependency: Option<Vec<String>>,
    pub timeout: Option<Vec<String>>,
}

impl AutoFixConfig {
    pub fn command_for(&self, class: FailureClass) -> Option<&[String]> {
        let command = match class {
            FailureClass::MissingDependency => self.missing_dependency.as_ref(),
            FailureClass::Timeout => self.timeout.as_ref(),
            FailureClass::Unrecoverable => None,
        };
        command.map(Vec::as_slice)
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            mode_timeout_secs: 60 * 60,
            command_output_limit_bytes: 100_000,
            validation: ValidationConfig::default(),
            generators: GeneratorConfig::default(),
            autofix: AutoFixConfig::default(),
            layout: ArtifactLayout::default(),
        }
    }
}

impl ConductorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(anyhow!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}"
            ));
        }
        if self.mode_timeout_secs == 0 {
            return Err(anyhow!("mode_timeout_secs must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if !is_command(&self.validation.command) {
            return Err(anyhow!("validation.command must be a non-empty array"));
        }
        for (name, command) in self.generators.entries() {
            if let Some(command) = command
                && !is_command(command)
            {
                return Err(anyhow!("generators.{name} must be a non-empty array"));
            }
        }
        for (name, command) in [
            ("missing_dependency", self.autofix.missing_dependency.as_ref()),
            ("timeout", self.autofix.timeout.as_ref()),
        ] {
            if let Some(command) = command
                && !is_command(command)
            {
                return Err(anyhow!("autofix.{name} must be a non-empty array"));
            }
        }
        let layout_errors = self.layout.validate();
        if !layout_errors.is_empty() {
            return Err(anyhow!("layout: {}", layout_errors.join("; ")));
        }
        Ok(())
    }
}

fn is_command(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConductorConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConductorConfig> {
    if !path.exists() {
        let cfg = ConductorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConductorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ConductorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}
