//! Auto-fix collaborator invoked between validation attempts for recoverable failures.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::core::types::FailureClass;
use crate::io::config::AutoFixConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

#[derive(Debug, Clone)]
pub struct FixRequest {
    pub class: FailureClass,
    /// Failure details of the attempt being fixed, one per line on stdin.
    pub details: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Applied,
    /// No fixer exists for this class; the retry proceeds anyway.
    Skipped,
}

pub trait AutoFixer {
    fn fix(&self, request: &FixRequest) -> Result<FixOutcome>;
}

/// Fixer running the command configured for the failure class, if any.
pub struct CommandAutoFixer {
    pub config: AutoFixConfig,
    pub workdir: PathBuf,
    pub output_limit_bytes: usize,
}

impl AutoFixer for CommandAutoFixer {
    fn fix(&self, request: &FixRequest) -> Result<FixOutcome> {
        let Some(argv) = self.config.command_for(request.class) else {
            info!(class = request.class.as_str(), "no auto-fix configured");
            return Ok(FixOutcome::Skipped);
        };
        info!(class = request.class.as_str(), command = ?argv, "running auto-fix");
        let cmd = command_from_argv(argv, &self.workdir)?;
        let input = request.details.join("\n");
        let output = run_command_with_timeout(
            cmd,
            Some(input.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
        )
        .context("run auto-fix command")?;
        if output.timed_out {
            return Err(anyhow!("auto-fix timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "auto-fix failed");
            return Err(anyhow!(
                "auto-fix failed with status {:?}",
                output.status.code()
            ));
        }
        Ok(FixOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(class: FailureClass) -> FixRequest {
        FixRequest {
            class,
            details: vec!["Cannot find module 'x'".to_string()],
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn unconfigured_class_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fixer = CommandAutoFixer {
            config: AutoFixConfig::default(),
            workdir: temp.path().to_path_buf(),
            output_limit_bytes: 100,
        };
        let outcome = fixer.fix(&request(FailureClass::MissingDependency)).expect("fix");
        assert_eq!(outcome, FixOutcome::Skipped);
    }

    #[cfg(unix)]
    #[test]
    fn configured_command_receives_details() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("fixed.txt");
        let fixer = CommandAutoFixer {
            config: AutoFixConfig {
                missing_dependency: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("cat > {}", marker.display()),
                ]),
                timeout: None,
            },
            workdir: temp.path().to_path_buf(),
            output_limit_bytes: 100,
        };
        let outcome = fixer.fix(&request(FailureClass::MissingDependency)).expect("fix");
        assert_eq!(outcome, FixOutcome::Applied);
        let received = std::fs::read_to_string(&marker).expect("read marker");
        assert_eq!(received, "Cannot find module 'x'");
    }
}
