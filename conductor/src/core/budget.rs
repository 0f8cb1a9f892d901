//! Shared time budget helpers for one dispatcher invocation.

use std::time::{Duration, Instant};

/// Wall-clock deadline for a mode invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Remaining budget, or `None` once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        remaining_budget(self.0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_none()
    }
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    (!remaining.is_zero()).then_some(remaining)
}
