//! Bounded retry around the validation-run collaborator.
//!
//! [`run_with_retry`] never returns an error: every failure, including a
//! collaborator error or an exhausted time budget, is folded into the returned
//! [`RetryOutcome`] so callers branch on data.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::core::budget::Deadline;
use crate::core::failure::{FailureClassifier, FailureSignal};
use crate::core::types::{FailureClass, ValidationReport};
use crate::io::autofix::{AutoFixer, FixOutcome, FixRequest};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub deadline: Deadline,
}

/// Structured result of a retried validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub success: bool,
    pub attempts_used: u32,
    pub last_failure_reason: Option<String>,
    /// Report from the last attempt that produced one.
    pub last_report: Option<ValidationReport>,
    /// Classification of each failed attempt that was classified, in order.
    pub classifications: Vec<FailureClass>,
    /// The mode's time budget ran out before validation could pass.
    pub budget_exhausted: bool,
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// `operation` receives the 1-based attempt number and the remaining budget.
/// After a failed attempt the failure is classified: recoverable failures get
/// an auto-fix and another attempt, unrecoverable ones stop immediately.
pub fn run_with_retry<F>(
    mut operation: F,
    policy: RetryPolicy,
    classifier: &dyn FailureClassifier,
    fixer: &dyn AutoFixer,
) -> RetryOutcome
where
    F: FnMut(u32, Duration) -> Result<ValidationReport>,
{
    let mut outcome = RetryOutcome {
        success: false,
        attempts_used: 0,
        last_failure_reason: None,
        last_report: None,
        classifications: Vec::new(),
        budget_exhausted: false,
    };

    for attempt in 1..=policy.max_attempts.max(1) {
        let Some(remaining) = policy.deadline.remaining() else {
            warn!(attempt, "time budget exhausted before validation attempt");
            outcome.budget_exhausted = true;
            outcome.last_failure_reason = Some("time budget exhausted".to_string());
            break;
        };

        outcome.attempts_used = attempt;
        let details = match operation(attempt, remaining) {
            Ok(report) if report.is_green() => {
                debug!(attempt, passed = report.passed, "validation green");
                outcome.success = true;
                outcome.last_failure_reason = None;
                outcome.last_report = Some(report);
                break;
            }
            Ok(report) => {
                let details = report.failure_details.clone();
                outcome.last_report = Some(report);
                details
            }
            Err(err) => vec![format!("{err:#}")],
        };
        let signal = FailureSignal { attempt, details };
        outcome.last_failure_reason = Some(signal.summary());

        // A run cut short by the deadline says nothing about the code under test.
        if policy.deadline.is_exhausted() {
            warn!(attempt, "time budget exhausted during validation attempt");
            outcome.budget_exhausted = true;
            break;
        }

        if attempt >= policy.max_attempts {
            info!(attempt, "validation attempts exhausted");
            break;
        }

        let class = classifier.classify(&signal);
        outcome.classifications.push(class);
        if !class.is_recoverable() {
            info!(attempt, "unrecoverable failure; not retrying");
            break;
        }

        let Some(remaining) = policy.deadline.remaining() else {
            outcome.budget_exhausted = true;
            break;
        };
        let fix = fixer.fix(&FixRequest {
            class,
            details: signal.details.clone(),
            timeout: remaining,
        });
        match fix {
            Ok(FixOutcome::Applied) => info!(attempt, class = class.as_str(), "auto-fix applied"),
            Ok(FixOutcome::Skipped) => debug!(attempt, class = class.as_str(), "auto-fix skipped"),
            Err(err) => {
                warn!(attempt, err = %err, "auto-fix failed; not retrying");
                outcome.last_failure_reason =
                    Some(format!("{}; auto-fix failed: {err:#}", signal.summary()));
                break;
            }
        }
    }

    outcome
}
