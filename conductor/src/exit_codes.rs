//! Stable exit codes for conductor CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, invalid layout/config/state, or an internal I/O error.
pub const INVALID: i32 = 1;
/// The requested mode name is not recognized.
pub const UNKNOWN_MODE: i32 = 2;
/// Another mode is active and `--force` was not given.
pub const MODE_CONFLICT: i32 = 3;
/// A mutation outside the active role's authorized artifact classes was requested.
pub const CONSTRAINT_VIOLATION: i32 = 4;
/// `refactor`/`step_optimize` found failing checks before starting.
pub const BASELINE_NOT_GREEN: i32 = 5;
/// Validation failed after retries, or a batch finished with failed features.
pub const VALIDATION_FAILURE: i32 = 6;
/// The per-invocation time budget was exhausted.
pub const TIMEOUT: i32 = 7;
/// A referenced specification or artifact does not exist.
pub const MISSING_ARTIFACT: i32 = 8;
