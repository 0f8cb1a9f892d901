//! `reset` pseudo-mode.
//!
//! A soft reset releases the active mode and keeps features and history. A hard
//! reset also drops every feature record and the history; specification
//! documents on disk are never touched.

use tracing::info;

use crate::core::types::ModeName;
use crate::error::WorkflowError;
use crate::workflow::WorkflowState;

use super::{ModeContext, ModeController, ModeReport, plural};

pub struct ResetMode;

impl ModeController for ResetMode {
    fn run(
        &self,
        state: &mut WorkflowState,
        ctx: &ModeContext<'_>,
    ) -> Result<ModeReport, WorkflowError> {
        let released = state.mode;
        if ctx.options.hard {
            let features = state.features.len();
            let entries = state.history.len();
            state.hard_reset();
            info!(features, entries, "hard reset");
            return Ok(ModeReport::new(
                ModeName::Reset,
                "hard_reset",
                format!(
                    "hard reset: released {released}, dropped {} and {entries} history entries",
                    plural(features, "feature"),
                ),
            ));
        }

        state.soft_reset();
        info!(%released, "soft reset");
        Ok(ModeReport::new(
            ModeName::Reset,
            "soft_reset",
            format!(
                "soft reset: released {released}, kept {}",
                plural(state.features.len(), "feature")
            ),
        ))
    }
}
