//! Diagnostic tracing for the conductor.
//!
//! Tracing goes to stderr and is filtered by `RUST_LOG`. It is never part of
//! what a mode produces: stdout carries the rendered report, and the audit
//! trail is the `history` persisted in `.conductor/state.json`
//! (see `workflow::HistoryEntry`), which is written regardless of `RUST_LOG`.

use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber. Later calls are no-ops.
///
/// ```bash
/// RUST_LOG=conductor=debug conductor implement --all
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .compact();

    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
