//! Command dispatcher: one locked read-modify-write of the workflow state per
//! invocation.
//!
//! The dispatcher resolves the mode controller, enforces the single active
//! mode, runs the controller, verifies status progression, renders the report,
//! and appends the history entry. The state file is the only thing it writes
//! directly; artifact writes happen inside controllers.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::budget::Deadline;
use crate::core::failure::PatternClassifier;
use crate::core::invariants::validate_invariants;
use crate::core::lifecycle::{ReopenPolicy, check_status_progression, check_statuses_unchanged};
use crate::core::types::{Mode, ModeName, Outcome};
use crate::error::WorkflowError;
use crate::io::autofix::CommandAutoFixer;
use crate::io::config::ConductorConfig;
use crate::io::generator::ConfiguredGenerator;
use crate::io::paths::{WorkspacePaths, ensure_layout};
use crate::io::report::{FileReportWriter, ReportEngine, ReportTemplate};
use crate::io::specs::FileSpecDocuments;
use crate::io::state_store::{StateLock, StateStore};
use crate::io::validation::CommandValidator;
use crate::modes::{Collaborators, ModeContext, ModeOptions, ModeReport, controller_for};
use crate::workflow::{FeatureRecord, HistoryEntry, WorkflowState};

/// One parsed CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub mode: ModeName,
    pub feature: Option<String>,
    pub options: ModeOptions,
}

impl DispatchRequest {
    pub fn new(mode: ModeName) -> Self {
        Self {
            mode,
            feature: None,
            options: ModeOptions::default(),
        }
    }

    pub fn feature(mut self, id: &str) -> Self {
        self.feature = Some(id.to_string());
        self
    }

    pub fn options(mut self, options: ModeOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The state as persisted at the end of the invocation.
    pub state: WorkflowState,
    pub report: ModeReport,
}

/// Production collaborators: command-backed generators, validator and
/// auto-fixer, file-backed specifications and reports.
pub struct DefaultCollaborators {
    specs: FileSpecDocuments,
    generator: ConfiguredGenerator,
    validator: CommandValidator,
    classifier: PatternClassifier,
    fixer: CommandAutoFixer,
    reports: FileReportWriter,
}

impl DefaultCollaborators {
    pub fn new(paths: &WorkspacePaths, config: &ConductorConfig) -> Self {
        let limit = config.command_output_limit_bytes;
        Self {
            specs: FileSpecDocuments {
                root: paths.root.clone(),
                spec_dir: config.layout.spec_dir.clone(),
            },
            generator: ConfiguredGenerator {
                config: config.generators.clone(),
                workdir: paths.root.clone(),
                output_limit_bytes: limit,
            },
            validator: CommandValidator {
                command: config.validation.command.clone(),
                workdir: paths.root.clone(),
                output_limit_bytes: limit,
            },
            classifier: PatternClassifier,
            fixer: CommandAutoFixer {
                config: config.autofix.clone(),
                workdir: paths.root.clone(),
                output_limit_bytes: limit,
            },
            reports: FileReportWriter {
                reports_dir: paths.reports_dir.clone(),
            },
        }
    }

    pub fn borrow(&self) -> Collaborators<'_> {
        Collaborators {
            specs: &self.specs,
            generator: &self.generator,
            validator: &self.validator,
            classifier: &self.classifier,
            fixer: &self.fixer,
            reports: &self.reports,
        }
    }
}

/// Run one mode invocation against the workspace at `paths.root`.
///
/// Option errors are rejected before the state is touched and leave no trace.
/// Every other failure, including one while reporting on a finished run, is
/// recorded as a `failed` history entry and releases the mode before it is
/// returned.
pub fn dispatch(
    paths: &WorkspacePaths,
    config: &ConductorConfig,
    request: &DispatchRequest,
    collaborators: Collaborators<'_>,
) -> Result<DispatchOutcome, WorkflowError> {
    request
        .options
        .validate_for(request.mode, request.feature.as_deref())?;
    let engine = ReportEngine::new()?;

    ensure_layout(paths)?;
    let _lock = StateLock::acquire(&paths.lock_path)?;
    let store = StateStore::new(paths);
    let mut state = store.load_or_default()?;
    debug!(mode = %request.mode, stored = %state.mode, "dispatching");

    let target = request.mode.active_mode();
    if let Some(mode) = target
        && state.mode != Mode::Idle
        && state.mode != mode
    {
        if !request.options.force {
            let err = WorkflowError::ModeConflict {
                active: state.mode,
                requested: request.mode,
            };
            warn!(active = %state.mode, requested = %request.mode, kind = err.kind(), "mode conflict");
            record_failure(&mut state, request, "switch", &err);
            store.save(&state)?;
            return Err(err);
        }
        warn!(
            abandoned = %state.mode,
            feature = ?state.current_feature,
            requested = %request.mode,
            "forcing mode switch; abandoned feature left as is"
        );
        state.release_mode();
    }

    let held = (state.mode, state.started_at, state.current_feature.clone());
    let before = state.features.clone();
    if let Some(mode) = target {
        state.enter_mode(mode, Utc::now());
        store.save(&state)?;
    }

    let checkpoint = |snapshot: &WorkflowState| store.save(snapshot);
    let ctx = ModeContext {
        paths,
        config,
        feature: request.feature.as_deref(),
        options: &request.options,
        collaborators,
        deadline: Deadline::after(Duration::from_secs(config.mode_timeout_secs)),
        checkpoint: &checkpoint,
    };

    let outcome = controller_for(request.mode)
        .run(&mut state, &ctx)
        .and_then(|mut report| {
            let violations = progression_violations(request, &before, &state);
            if !violations.is_empty() {
                state.features = before;
                return Err(WorkflowError::ConstraintViolation(violations));
            }
            if target.is_some() && report.terminal {
                state.release_mode();
            }
            if request.mode != ModeName::Status {
                let errors = validate_invariants(&state);
                if !errors.is_empty() {
                    state.features = before;
                    return Err(WorkflowError::Internal(anyhow!(
                        "refusing to persist invalid state:\n- {}",
                        errors.join("\n- ")
                    )));
                }
            }
            report.rendered = match &report.status {
                Some(view) => engine.render(ReportTemplate::Status, view)?,
                None => engine.render(ReportTemplate::Mode, &report)?,
            };
            report.report_path =
                Some(collaborators.reports.write(request.mode.as_str(), &report.rendered)?);
            Ok(report)
        });
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            (state.mode, state.started_at, state.current_feature) = held;
            if request.mode != ModeName::Status {
                record_failure(&mut state, request, request.mode.as_str(), &err);
                store.save(&state)?;
            }
            warn!(mode = %request.mode, kind = err.kind(), err = %err, "mode failed");
            return Err(err);
        }
    };

    if audited(request) {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            mode: request.mode,
            action: report.action.clone(),
            feature_id: request.feature.clone().or_else(|| match report.features.as_slice() {
                [only] => Some(only.id.clone()),
                _ => None,
            }),
            outcome: report.outcome(),
            reason: report.failure_reason(),
        };
        state.append_history(entry);
    }
    if request.mode != ModeName::Status {
        store.save(&state)?;
    }
    info!(
        mode = %request.mode,
        action = %report.action,
        outcome = report.outcome().as_str(),
        held = %state.mode,
        "mode finished"
    );
    Ok(DispatchOutcome { state, report })
}

/// `status` is a read-only query and a hard reset wipes the history it would
/// be appended to; everything else is audited.
fn audited(request: &DispatchRequest) -> bool {
    match request.mode {
        ModeName::Status => false,
        ModeName::Reset => !request.options.hard,
        _ => true,
    }
}

/// Status moves the controller made that the lifecycle does not allow.
fn progression_violations(
    request: &DispatchRequest,
    before: &BTreeMap<String, FeatureRecord>,
    state: &WorkflowState,
) -> Vec<String> {
    let mut violations = match request.mode {
        ModeName::Reset if request.options.hard => Vec::new(),
        ModeName::Refactor | ModeName::StepOptimize => {
            check_statuses_unchanged(before, &state.features)
        }
        _ => check_status_progression(
            before,
            &state.features,
            ReopenPolicy {
                retry: request.options.retry,
                force: request.options.force,
            },
        ),
    };
    violations.sort();
    violations
}

fn record_failure(
    state: &mut WorkflowState,
    request: &DispatchRequest,
    action: &str,
    err: &WorkflowError,
) {
    state.append_history(HistoryEntry {
        timestamp: Utc::now(),
        mode: request.mode,
        action: action.to_string(),
        feature_id: request.feature.clone(),
        outcome: Outcome::Failed,
        reason: Some(err.to_string()),
    });
}
