//! Classification of failed validation attempts.
//!
//! The retry handler asks a [`FailureClassifier`] whether a failure is worth an
//! auto-fix and another attempt. [`PatternClassifier`] is the default: a small
//! set of regexes over the failure text.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::FailureClass;

/// What the classifier sees of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSignal {
    pub attempt: u32,
    /// Failure details from the validation report, or the collaborator error.
    pub details: Vec<String>,
}

impl FailureSignal {
    pub fn summary(&self) -> String {
        let text = self
            .details
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        if text.is_empty() {
            "validation reported failures without details".to_string()
        } else {
            text
        }
    }
}

pub trait FailureClassifier {
    fn classify(&self, signal: &FailureSignal) -> FailureClass;
}

static MISSING_DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(cannot find module|module not found|no module named|unresolved import|could not resolve dependency|missing dependency|package .* not found|command not found)",
    )
    .expect("missing-dependency pattern is valid")
});

static TIMEOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(timed out|timeout|deadline exceeded)").expect("timeout pattern is valid")
});

/// Regex-based classifier. Anything not matched is unrecoverable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternClassifier;

impl FailureClassifier for PatternClassifier {
    fn classify(&self, signal: &FailureSignal) -> FailureClass {
        classify_details(&signal.details)
    }
}

pub fn classify_details(details: &[String]) -> FailureClass {
    if details.iter().any(|line| MISSING_DEPENDENCY_RE.is_match(line)) {
        return FailureClass::MissingDependency;
    }
    if details.iter().any(|line| TIMEOUT_RE.is_match(line)) {
        return FailureClass::Timeout;
    }
    FailureClass::Unrecoverable
}
