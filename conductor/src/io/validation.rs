//! Validation-run collaborator: runs the configured test command and parses
//! its summary into a [`ValidationReport`].

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::core::types::ValidationReport;
use crate::io::process::{command_from_argv, run_command_with_timeout};

const MAX_FAILURE_DETAILS: usize = 20;

/// Parameters for one validation run.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// Narrowing hint (feature id or `--scope` value); `None` runs everything.
    pub scope: Option<String>,
    pub timeout: Duration,
}

/// Abstraction over validation backends.
pub trait Validator {
    fn run(&self, request: &ValidationRequest) -> Result<ValidationReport>;
}

/// Validator that spawns the configured command. The scope, when present, is
/// appended as the final argument.
pub struct CommandValidator {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub output_limit_bytes: usize,
}

impl Validator for CommandValidator {
    #[instrument(skip_all, fields(scope = ?request.scope, timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &ValidationRequest) -> Result<ValidationReport> {
        let mut cmd = command_from_argv(&self.command, &self.workdir)?;
        if let Some(scope) = &request.scope {
            cmd.arg(scope);
        }
        info!(command = ?self.command, "running validation");
        let output = run_command_with_timeout(cmd, None, request.timeout, self.output_limit_bytes)
            .context("run validation command")?;

        let text = output.combined_text();
        let mut report = parse_summary(&text);
        if output.timed_out {
            warn!("validation timed out");
            report.failed = report.failed.max(1);
            report.failure_details.push(format!(
                "validation timed out after {}s",
                request.timeout.as_secs()
            ));
        } else if !output.status.success() && report.failed == 0 {
            report.failed = 1;
            report.failure_details.push(format!(
                "validation command exited with status {:?}",
                output.status.code()
            ));
        }
        debug!(
            passed = report.passed,
            failed = report.failed,
            pending = report.pending,
            "validation finished"
        );
        Ok(report)
    }
}

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(passed|failed|pending|skipped|undefined)\b")
        .expect("count pattern is valid")
});

static FAILURE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(error|fail|✗|timed out|not found)").expect("failure pattern is valid")
});

/// Parse `N passed`, `N failed`, `N pending|skipped|undefined` counts out of tool
/// output. Counts for the same label are summed across lines.
pub fn parse_summary(text: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    for caps in COUNT_RE.captures_iter(text) {
        let count = caps[1].parse::<u32>().unwrap_or(0);
        match caps[2].to_ascii_lowercase().as_str() {
            "passed" => report.passed += count,
            "failed" => report.failed += count,
            _ => report.pending += count,
        }
    }
    if report.failed > 0 {
        report.failure_details = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !COUNT_RE.is_match(line))
            .filter(|line| FAILURE_LINE_RE.is_match(line))
            .take(MAX_FAILURE_DETAILS)
            .map(str::to_string)
            .collect();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cucumber_style_summary() {
        let text = "3 scenarios (1 failed, 2 passed)\n9 steps (1 failed, 1 skipped, 7 passed)\nError: expected 200 got 500\n";
        let report = parse_summary(text);
        assert_eq!(report.passed, 9);
        assert_eq!(report.failed, 2);
        assert_eq!(report.pending, 1);
        assert_eq!(report.failure_details, vec!["Error: expected 200 got 500".to_string()]);
    }

    #[test]
    fn green_output_has_no_details() {
        let report = parse_summary("12 passed\nall good\n");
        assert!(report.is_green());
        assert!(report.failure_details.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_without_counts_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let validator = CommandValidator {
            command: vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 2".to_string()],
            workdir: temp.path().to_path_buf(),
            output_limit_bytes: 1000,
        };
        let report = validator
            .run(&ValidationRequest {
                scope: None,
                timeout: Duration::from_secs(5),
            })
            .expect("run");
        assert_eq!(report.failed, 1);
        assert!(report.failure_details[0].contains("exited with status Some(2)"));
    }

    #[cfg(unix)]
    #[test]
    fn scope_is_passed_as_last_argument() {
        let temp = tempfile::tempdir().expect("tempdir");
        let validator = CommandValidator {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo \"$0 passed\"".to_string(),
            ],
            workdir: temp.path().to_path_buf(),
            output_limit_bytes: 1000,
        };
        let report = validator
            .run(&ValidationRequest {
                scope: Some("4".to_string()),
                timeout: Duration::from_secs(5),
            })
            .expect("run");
        assert_eq!(report.passed, 4);
        assert!(report.is_green());
    }
}
