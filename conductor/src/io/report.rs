//! Report rendering (minijinja) and the report-writer collaborator.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

use crate::io::paths::write_atomic;

const STATUS_TEMPLATE: &str = include_str!("templates/status.md");
const MODE_TEMPLATE: &str = include_str!("templates/mode.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTemplate {
    Status,
    Mode,
}

impl ReportTemplate {
    fn name(self) -> &'static str {
        match self {
            ReportTemplate::Status => "status",
            ReportTemplate::Mode => "mode",
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct ReportEngine {
    env: Environment<'static>,
}

impl ReportEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("status", STATUS_TEMPLATE)
            .context("load status template")?;
        env.add_template("mode", MODE_TEMPLATE)
            .context("load mode template")?;
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, template: ReportTemplate, value: &S) -> Result<String> {
        let compiled = self.env.get_template(template.name())?;
        let mut rendered = compiled
            .render(value)
            .with_context(|| format!("render {} report", template.name()))?;
        let trimmed_len = rendered.trim_end().len();
        rendered.truncate(trimmed_len);
        rendered.push('\n');
        Ok(rendered)
    }
}

/// Abstraction over where reports go.
pub trait ReportWriter {
    /// Persist `content` under `kind`, returning where it was written.
    fn write(&self, kind: &str, content: &str) -> Result<PathBuf>;
}

/// Writes `<reports_dir>/<kind>.md`, replacing any previous report of that kind.
pub struct FileReportWriter {
    pub reports_dir: PathBuf,
}

impl ReportWriter for FileReportWriter {
    fn write(&self, kind: &str, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.reports_dir)
            .with_context(|| format!("create directory {}", self.reports_dir.display()))?;
        let path = self.reports_dir.join(format!("{kind}.md"));
        write_atomic(&path, content.as_bytes())?;
        debug!(path = %path.display(), "report written");
        Ok(path)
    }
}
