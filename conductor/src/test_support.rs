//! Test-only helpers: deterministic state builders, scripted collaborators,
//! and a temporary workspace wired to them.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{TimeZone, Utc};

use crate::core::failure::{FailureClassifier, FailureSignal};
use crate::core::types::{FailureClass, FeatureStatus, Mode, ModeName, Outcome, TestResults, ValidationReport};
use crate::dispatch::{DispatchOutcome, DispatchRequest, dispatch};
use crate::error::WorkflowError;
use crate::io::autofix::{AutoFixer, FixOutcome, FixRequest};
use crate::io::config::ConductorConfig;
use crate::io::generator::{ArtifactGenerator, GenerationOutput, GenerationRequest};
use crate::io::paths::WorkspacePaths;
use crate::io::report::ReportWriter;
use crate::io::specs::{FileSpecDocuments, SpecDocuments};
use crate::io::state_store::StateStore;
use crate::io::validation::{ValidationRequest, Validator};
use crate::modes::Collaborators;
use crate::workflow::{FeatureRecord, HistoryEntry, WorkflowState};

/// Create a record in `status` with no timestamps and empty results.
pub fn feature(status: FeatureStatus) -> FeatureRecord {
    FeatureRecord {
        status,
        created: None,
        steps_defined_at: None,
        implementation_started_at: None,
        test_results: TestResults::default(),
        failure_reason: None,
    }
}

/// Idle state holding the given features.
pub fn state_with_features(features: &[(&str, FeatureStatus)]) -> WorkflowState {
    let mut state = WorkflowState::default();
    for (id, status) in features {
        state.features.insert((*id).to_string(), feature(*status));
    }
    state
}

/// A succeeded history entry with a fixed timestamp.
pub fn history_entry(mode: ModeName) -> HistoryEntry {
    HistoryEntry {
        timestamp: Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .expect("fixed timestamp"),
        mode,
        action: mode.as_str().to_string(),
        feature_id: None,
        outcome: Outcome::Succeeded,
        reason: None,
    }
}

/// A failing report carrying one detail line.
pub fn red(detail: &str) -> ValidationReport {
    ValidationReport {
        passed: 0,
        failed: 1,
        pending: 0,
        failure_details: vec![detail.to_string()],
    }
}

pub fn green(passed: u32) -> ValidationReport {
    ValidationReport {
        passed,
        ..ValidationReport::default()
    }
}

/// Classifier returning scripted classes in order; the last one repeats.
pub struct ScriptedClassifier {
    classes: RefCell<VecDeque<FailureClass>>,
    last: FailureClass,
}

impl ScriptedClassifier {
    pub fn always(class: FailureClass) -> Self {
        Self::sequence(vec![class])
    }

    pub fn sequence(classes: Vec<FailureClass>) -> Self {
        let last = classes.last().copied().unwrap_or(FailureClass::Unrecoverable);
        Self {
            classes: RefCell::new(classes.into()),
            last,
        }
    }
}

impl FailureClassifier for ScriptedClassifier {
    fn classify(&self, _signal: &FailureSignal) -> FailureClass {
        self.classes.borrow_mut().pop_front().unwrap_or(self.last)
    }
}

/// Fixer that records each requested class.
#[derive(Default)]
pub struct RecordingFixer {
    calls: RefCell<Vec<FailureClass>>,
    fail: bool,
}

impl RecordingFixer {
    pub fn failing() -> Self {
        Self {
            calls: RefCell::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<FailureClass> {
        self.calls.borrow().clone()
    }
}

impl AutoFixer for RecordingFixer {
    fn fix(&self, request: &FixRequest) -> Result<FixOutcome> {
        self.calls.borrow_mut().push(request.class);
        if self.fail {
            return Err(anyhow!("fixer exploded"));
        }
        Ok(FixOutcome::Applied)
    }
}

/// Validator replaying scripted reports per scope. Unscripted runs are green.
#[derive(Default)]
pub struct ScriptedValidator {
    scripts: RefCell<BTreeMap<Option<String>, VecDeque<ValidationReport>>>,
    calls: RefCell<Vec<Option<String>>>,
    delay: Cell<Duration>,
}

impl ScriptedValidator {
    /// Queue `reports` for runs scoped to `scope` (`None` = unscoped runs).
    pub fn script(&self, scope: Option<&str>, reports: Vec<ValidationReport>) {
        self.scripts
            .borrow_mut()
            .entry(scope.map(str::to_string))
            .or_default()
            .extend(reports);
    }

    /// Make every later run take at least `delay`.
    pub fn slow(&self, delay: Duration) {
        self.delay.set(delay);
    }

    /// Scope of every run so far, in order.
    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.borrow().clone()
    }
}

impl Validator for ScriptedValidator {
    fn run(&self, request: &ValidationRequest) -> Result<ValidationReport> {
        self.calls.borrow_mut().push(request.scope.clone());
        thread::sleep(self.delay.get());
        let next = self
            .scripts
            .borrow_mut()
            .get_mut(&request.scope)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| green(1)))
    }
}

/// Generator returning canned output per `(mode, feature)`. Unscripted
/// requests get an empty output.
#[derive(Default)]
pub struct ScriptedGenerator {
    outputs: RefCell<BTreeMap<(Mode, Option<String>), GenerationOutput>>,
    failures: RefCell<BTreeMap<(Mode, Option<String>), String>>,
    requests: RefCell<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn respond(&self, mode: Mode, feature: Option<&str>, output: GenerationOutput) {
        self.outputs
            .borrow_mut()
            .insert((mode, feature.map(str::to_string)), output);
    }

    pub fn fail(&self, mode: Mode, feature: Option<&str>, message: &str) {
        self.failures
            .borrow_mut()
            .insert((mode, feature.map(str::to_string)), message.to_string());
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.borrow().clone()
    }
}

impl ArtifactGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        self.requests.borrow_mut().push(request.clone());
        let key = (request.mode, request.feature_id.clone());
        if let Some(message) = self.failures.borrow().get(&key) {
            return Err(anyhow!("{message}"));
        }
        Ok(self.outputs.borrow().get(&key).cloned().unwrap_or_default())
    }
}

/// Report writer keeping reports in memory.
#[derive(Default)]
pub struct MemoryReportWriter {
    reports: RefCell<Vec<(String, String)>>,
    failure: RefCell<Option<String>>,
}

impl MemoryReportWriter {
    /// Fail every later write with `message`.
    pub fn fail(&self, message: &str) {
        *self.failure.borrow_mut() = Some(message.to_string());
    }

    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.borrow().clone()
    }
}

impl ReportWriter for MemoryReportWriter {
    fn write(&self, kind: &str, content: &str) -> Result<PathBuf> {
        if let Some(message) = self.failure.borrow().as_ref() {
            return Err(anyhow!("{message}"));
        }
        self.reports
            .borrow_mut()
            .push((kind.to_string(), content.to_string()));
        Ok(PathBuf::from(format!("memory/{kind}.md")))
    }
}

/// Temporary workspace with file-backed specifications and scripted
/// generator, validator, classifier, fixer, and report writer.
pub struct TestWorkspace {
    pub temp: tempfile::TempDir,
    pub paths: WorkspacePaths,
    pub config: ConductorConfig,
    pub specs: FileSpecDocuments,
    pub generator: ScriptedGenerator,
    pub validator: ScriptedValidator,
    pub classifier: ScriptedClassifier,
    pub fixer: RecordingFixer,
    pub reports: MemoryReportWriter,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = WorkspacePaths::new(temp.path());
        let config = ConductorConfig::default();
        let specs = FileSpecDocuments {
            root: paths.root.clone(),
            spec_dir: config.layout.spec_dir.clone(),
        };
        Self {
            temp,
            paths,
            config,
            specs,
            generator: ScriptedGenerator::default(),
            validator: ScriptedValidator::default(),
            classifier: ScriptedClassifier::always(FailureClass::Unrecoverable),
            fixer: RecordingFixer::default(),
            reports: MemoryReportWriter::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            specs: &self.specs,
            generator: &self.generator,
            validator: &self.validator,
            classifier: &self.classifier,
            fixer: &self.fixer,
            reports: &self.reports,
        }
    }

    pub fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, WorkflowError> {
        dispatch(&self.paths, &self.config, request, self.collaborators())
    }

    /// Persisted state as the next invocation would see it.
    pub fn state(&self) -> WorkflowState {
        StateStore::new(&self.paths)
            .load_or_default()
            .expect("load state")
    }

    /// Persist `state` directly, bypassing the dispatcher.
    pub fn seed(&self, state: &WorkflowState) {
        fs::create_dir_all(&self.paths.conductor_dir).expect("create .conductor");
        StateStore::new(&self.paths).save(state).expect("seed state");
    }

    /// Write a specification document by hand.
    pub fn write_spec(&self, id: &str, contents: &str) -> PathBuf {
        self.specs.create(id, contents).expect("write spec")
    }

    /// Absolute path of a workspace-relative file.
    pub fn file(&self, relative: &str) -> PathBuf {
        self.paths.root.join(relative)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
