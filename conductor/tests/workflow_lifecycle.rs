use std::fs;
use std::time::Duration;

use chrono::Utc;

use conductor::core::types::{FailureClass, FeatureStatus, Mode, ModeName, Outcome};
use conductor::dispatch::DispatchRequest;
use conductor::error::WorkflowError;
use conductor::exit_codes;
use conductor::io::generator::{GenerationOutput, ProposedChange};
use conductor::modes::ModeOptions;
use conductor::test_support::{
    ScriptedClassifier, TestWorkspace, history_entry, red, state_with_features,
};

fn request(mode: ModeName) -> DispatchRequest {
    DispatchRequest::new(mode)
}

fn proposes(changes: Vec<ProposedChange>) -> GenerationOutput {
    GenerationOutput {
        changes,
        pending: Vec::new(),
    }
}

/// requirements drafts a specification; the confirmation step confirms it and releases the mode.
#[test]
fn requirements_drafts_then_confirmation_confirms() {
    let ws = TestWorkspace::new();

    let drafted = ws
        .dispatch(&request(ModeName::Requirements).feature("user-auth"))
        .expect("draft");
    assert_eq!(drafted.state.features["user-auth"].status, FeatureStatus::Draft);
    assert_eq!(drafted.state.mode, Mode::Requirements);
    assert!(ws.file("features/user-auth.feature").is_file());

    let confirmed = ws
        .dispatch(
            &request(ModeName::Requirements)
                .feature("user-auth")
                .options(ModeOptions {
                    confirm: true,
                    ..ModeOptions::default()
                }),
        )
        .expect("confirm");
    assert_eq!(
        confirmed.state.features["user-auth"].status,
        FeatureStatus::Confirmed
    );
    assert_eq!(confirmed.state.mode, Mode::Idle);

    let document = fs::read_to_string(ws.file("features/user-auth.feature")).expect("read spec");
    assert!(document.starts_with("# user-auth\n"));
    assert!(document.ends_with("# conductor: status=confirmed\n"));

    let state = ws.state();
    let actions: Vec<&str> = state.history.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["create", "confirm"]);
}

/// Drafting twice is a no-op and an existing document is adopted rather than overwritten.
#[test]
fn requirements_never_overwrites_documents() {
    let ws = TestWorkspace::new();
    ws.write_spec("login", "Feature: Login\n");

    let outcome = ws
        .dispatch(&request(ModeName::Requirements).feature("login"))
        .expect("adopt");
    assert_eq!(outcome.state.features["login"].status, FeatureStatus::Draft);
    assert_eq!(
        fs::read_to_string(ws.file("features/login.feature")).expect("read"),
        "Feature: Login\n"
    );

    let again = ws
        .dispatch(&request(ModeName::Requirements).feature("login"))
        .expect("repeat");
    assert_eq!(again.report.outcome(), Outcome::Skipped);
}

/// A confirmed specification is frozen unless a human override is given.
#[test]
fn confirmed_specification_needs_human_override() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::Confirmed)]));
    ws.write_spec("login", "Feature: Login\n");
    ws.generator.respond(
        Mode::Requirements,
        Some("login"),
        proposes(vec![ProposedChange::write(
            "features/login.feature",
            "Feature: Login\n  Scenario: lockout\n",
        )]),
    );

    let err = ws
        .dispatch(&request(ModeName::Requirements).feature("login"))
        .unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::CONSTRAINT_VIOLATION);

    let revised = ws
        .dispatch(
            &request(ModeName::Requirements)
                .feature("login")
                .options(ModeOptions {
                    human_override: true,
                    ..ModeOptions::default()
                }),
        )
        .expect("revise");
    assert_eq!(revised.state.features["login"].status, FeatureStatus::Confirmed);
    let document = fs::read_to_string(ws.file("features/login.feature")).expect("read");
    assert!(document.contains("Scenario: lockout"));
    assert!(document.ends_with("# conductor: revised under human override\n"));
}

/// `--analyze` rebuilds records from documents that have none.
#[test]
fn analyze_registers_orphan_documents() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("search", FeatureStatus::Completed)]));
    ws.write_spec("search", "Feature: Search\n");
    ws.write_spec("checkout", "Feature: Checkout\n");
    ws.write_spec("profile", "Feature: Profile\n");

    let outcome = ws
        .dispatch(&request(ModeName::Requirements).options(ModeOptions {
            analyze: true,
            ..ModeOptions::default()
        }))
        .expect("analyze");

    let features = &outcome.state.features;
    assert_eq!(features.len(), 3);
    assert_eq!(features["checkout"].status, FeatureStatus::Draft);
    assert_eq!(features["profile"].status, FeatureStatus::Draft);
    assert_eq!(features["search"].status, FeatureStatus::Completed);
    assert_eq!(outcome.state.mode, Mode::Idle);
}

#[test]
fn context_is_set_once() {
    let ws = TestWorkspace::new();
    let capture = |value: &str| {
        request(ModeName::Requirements).options(ModeOptions {
            context: vec![("browser".to_string(), value.to_string())],
            ..ModeOptions::default()
        })
    };

    ws.dispatch(&capture("chromium")).expect("capture");
    let err = ws.dispatch(&capture("firefox")).unwrap_err();
    assert!(matches!(err, WorkflowError::ConstraintViolation(_)));
    assert_eq!(ws.state().context["browser"], "chromium");
}

/// steps advances a confirmed feature and is denied while the feature is still a draft.
#[test]
fn steps_requires_confirmed_specification() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("user-auth", FeatureStatus::Draft)]));
    ws.write_spec("user-auth", "Feature: Auth\n");

    let err = ws
        .dispatch(&request(ModeName::Steps).feature("user-auth"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ConstraintViolation(_)));
    let state = ws.state();
    assert_eq!(state.features["user-auth"].status, FeatureStatus::Draft);
    assert_eq!(state.mode, Mode::Idle);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].outcome, Outcome::Failed);

    ws.seed(&state_with_features(&[("user-auth", FeatureStatus::Confirmed)]));
    ws.generator.respond(
        Mode::Steps,
        Some("user-auth"),
        proposes(vec![ProposedChange::write(
            "features/step_definitions/user_auth_steps.rs",
            "// steps\n",
        )]),
    );
    let outcome = ws
        .dispatch(&request(ModeName::Steps).feature("user-auth"))
        .expect("steps");
    let record = &outcome.state.features["user-auth"];
    assert_eq!(record.status, FeatureStatus::StepsDefined);
    assert!(record.steps_defined_at.is_some());
    assert!(ws.file("features/step_definitions/user_auth_steps.rs").is_file());
    assert_eq!(ws.validator.calls(), vec![Some("user-auth".to_string())]);
    assert_eq!(outcome.state.mode, Mode::Idle);
}

/// A proposal outside the mode's artifact classes rejects the whole batch.
#[test]
fn steps_cannot_write_business_logic() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::Confirmed)]));
    ws.write_spec("login", "Feature: Login\n");
    ws.generator.respond(
        Mode::Steps,
        Some("login"),
        proposes(vec![
            ProposedChange::write("features/step_definitions/login_steps.rs", "// steps\n"),
            ProposedChange::write("src/login.rs", "pub fn login() {}\n"),
        ]),
    );

    let err = ws
        .dispatch(&request(ModeName::Steps).feature("login"))
        .unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::CONSTRAINT_VIOLATION);
    assert!(!ws.file("features/step_definitions/login_steps.rs").exists());
    assert!(!ws.file("src/login.rs").exists());
    assert_eq!(ws.state().features["login"].status, FeatureStatus::Confirmed);
}

/// implement --all over three features, one failing every attempt: two complete, one fails.
#[test]
fn implement_all_completes_two_and_fails_one() {
    let mut ws = TestWorkspace::new();
    ws.classifier = ScriptedClassifier::always(FailureClass::Timeout);
    ws.seed(&state_with_features(&[
        ("alpha", FeatureStatus::StepsDefined),
        ("beta", FeatureStatus::StepsDefined),
        ("gamma", FeatureStatus::StepsDefined),
    ]));
    ws.validator.script(
        Some("beta"),
        vec![red("timed out"), red("timed out"), red("timed out")],
    );

    let outcome = ws
        .dispatch(&request(ModeName::Implement).options(ModeOptions {
            all: true,
            ..ModeOptions::default()
        }))
        .expect("implement");

    let features = &outcome.state.features;
    let completed = features
        .values()
        .filter(|record| record.status == FeatureStatus::Completed)
        .count();
    let failed = features
        .values()
        .filter(|record| record.status == FeatureStatus::Failed)
        .count();
    assert_eq!((completed, failed), (2, 1));
    assert_eq!(features["beta"].failure_reason.as_deref(), Some("timed out"));
    assert_eq!(features["beta"].test_results.failed, 1);

    let beta = outcome
        .report
        .features
        .iter()
        .find(|feature| feature.id == "beta")
        .expect("beta outcome");
    assert_eq!(beta.attempts, 3);
    assert_eq!(ws.fixer.calls().len(), 2);
    assert_eq!(outcome.report.outcome(), Outcome::Failed);
    assert_eq!(outcome.state.mode, Mode::Implement);

    let retried = ws
        .dispatch(
            &request(ModeName::Implement)
                .feature("beta")
                .options(ModeOptions {
                    retry: true,
                    ..ModeOptions::default()
                }),
        )
        .expect("retry");
    let beta = &retried.state.features["beta"];
    assert_eq!(beta.status, FeatureStatus::Completed);
    assert_eq!(beta.failure_reason, None);
    assert_eq!(retried.state.mode, Mode::Idle);
}

/// Unrecoverable failures stop after one attempt.
#[test]
fn implement_unrecoverable_failure_uses_one_attempt() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::StepsDefined)]));
    ws.validator
        .script(Some("login"), vec![red("expected 200, got 500")]);

    let outcome = ws
        .dispatch(&request(ModeName::Implement).feature("login"))
        .expect("implement");
    assert_eq!(outcome.report.features[0].attempts, 1);
    assert_eq!(ws.validator.calls().len(), 1);
    assert_eq!(outcome.state.features["login"].status, FeatureStatus::Failed);
}

/// A failed feature is not re-entered without --retry or --force.
#[test]
fn failed_feature_needs_retry_flag() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::Failed)]));

    let err = ws
        .dispatch(&request(ModeName::Implement).feature("login"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ConstraintViolation(_)));
    assert_eq!(ws.state().features["login"].status, FeatureStatus::Failed);
}

/// Exhausting the time budget aborts with Timeout and leaves statuses unchanged.
#[test]
fn timeout_leaves_status_unchanged() {
    let mut ws = TestWorkspace::new();
    ws.config.mode_timeout_secs = 0;
    ws.seed(&state_with_features(&[("login", FeatureStatus::StepsDefined)]));

    let err = ws
        .dispatch(&request(ModeName::Implement).feature("login"))
        .unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::TIMEOUT);
    let state = ws.state();
    assert_eq!(state.features["login"].status, FeatureStatus::StepsDefined);
    assert_eq!(state.mode, Mode::Idle);
}

/// A validation run that outlives the budget aborts with Timeout instead of failing the feature.
#[test]
fn implement_validation_past_deadline_times_out() {
    let mut ws = TestWorkspace::new();
    ws.config.mode_timeout_secs = 1;
    ws.config.max_attempts = 1;
    ws.seed(&state_with_features(&[("login", FeatureStatus::StepsDefined)]));
    ws.validator.slow(Duration::from_millis(1200));
    ws.validator
        .script(Some("login"), vec![red("validation timed out")]);

    let err = ws
        .dispatch(&request(ModeName::Implement).feature("login"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout { mode: Mode::Implement }));
    let state = ws.state();
    let record = &state.features["login"];
    assert_eq!(record.status, FeatureStatus::StepsDefined);
    assert_eq!(record.failure_reason, None);
    assert_eq!(state.mode, Mode::Idle);
    assert_eq!(state.history.last().map(|e| e.outcome), Some(Outcome::Failed));
}

/// A baseline cut short by the budget is a timeout, not a red baseline.
#[test]
fn refactor_baseline_past_deadline_times_out() {
    let mut ws = TestWorkspace::new();
    ws.config.mode_timeout_secs = 1;
    ws.seed(&state_with_features(&[("login", FeatureStatus::Completed)]));
    ws.validator.slow(Duration::from_millis(1200));
    ws.validator.script(None, vec![red("validation timed out")]);

    let err = ws.dispatch(&request(ModeName::Refactor)).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::TIMEOUT);
    assert!(ws.generator.requests().is_empty());
    assert_eq!(ws.state().features["login"].status, FeatureStatus::Completed);
}

/// steps does not advance a feature whose validation run outlived the budget.
#[test]
fn steps_validation_past_deadline_times_out() {
    let mut ws = TestWorkspace::new();
    ws.config.mode_timeout_secs = 1;
    ws.seed(&state_with_features(&[("login", FeatureStatus::Confirmed)]));
    ws.write_spec("login", "Feature: Login\n");
    ws.validator.slow(Duration::from_millis(1200));

    let err = ws
        .dispatch(&request(ModeName::Steps).feature("login"))
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Timeout { mode: Mode::Steps }));
    let state = ws.state();
    assert_eq!(state.features["login"].status, FeatureStatus::Confirmed);
    assert_eq!(state.features["login"].steps_defined_at, None);
    assert_eq!(state.current_feature, None);
}

/// A report that cannot be written still leaves a failed history entry and releases the mode.
#[test]
fn report_write_failure_is_audited() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::StepsDefined)]));
    ws.reports.fail("disk full");

    let err = ws
        .dispatch(&request(ModeName::Implement).feature("login"))
        .unwrap_err();
    assert_eq!(err.to_string(), "disk full");
    let state = ws.state();
    assert_eq!(state.mode, Mode::Idle);
    assert_eq!(state.features["login"].status, FeatureStatus::Completed);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].outcome, Outcome::Failed);
    assert_eq!(state.history[0].reason.as_deref(), Some("disk full"));
}

/// Hard reset on 5 features and 40 history entries leaves an empty idle state.
#[test]
fn hard_reset_clears_features_and_history() {
    let ws = TestWorkspace::new();
    let mut state = state_with_features(&[
        ("a", FeatureStatus::Draft),
        ("b", FeatureStatus::Confirmed),
        ("c", FeatureStatus::StepsDefined),
        ("d", FeatureStatus::Completed),
        ("e", FeatureStatus::Failed),
    ]);
    state.mode = Mode::Implement;
    state.started_at = Some(Utc::now());
    for _ in 0..40 {
        state.history.push(history_entry(ModeName::Implement));
    }
    ws.seed(&state);
    ws.write_spec("a", "Feature: A\n");

    let outcome = ws
        .dispatch(&request(ModeName::Reset).options(ModeOptions {
            hard: true,
            ..ModeOptions::default()
        }))
        .expect("reset");

    let state = ws.state();
    assert!(state.features.is_empty());
    assert!(state.history.is_empty());
    assert_eq!(state.mode, Mode::Idle);
    assert_eq!(outcome.state, state);
    assert!(ws.file("features/a.feature").is_file());
}

#[test]
fn soft_reset_keeps_features_and_audits() {
    let ws = TestWorkspace::new();
    let mut state = state_with_features(&[("a", FeatureStatus::Confirmed)]);
    state.mode = Mode::Steps;
    state.started_at = Some(Utc::now());
    ws.seed(&state);

    ws.dispatch(&request(ModeName::Reset)).expect("reset");
    let state = ws.state();
    assert_eq!(state.mode, Mode::Idle);
    assert_eq!(state.features.len(), 1);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].action, "soft_reset");
}

/// status twice with no mutation in between: identical reports, untouched state file.
#[test]
fn status_is_idempotent_and_unaudited() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[
        ("a", FeatureStatus::Confirmed),
        ("b", FeatureStatus::Failed),
    ]));
    let before = fs::read(&ws.paths.state_path).expect("read state");

    let first = ws.dispatch(&request(ModeName::Status)).expect("status");
    let second = ws.dispatch(&request(ModeName::Status)).expect("status");

    assert_eq!(first.report.rendered, second.report.rendered);
    assert!(first.report.rendered.contains("| b | failed |"));
    assert_eq!(fs::read(&ws.paths.state_path).expect("read state"), before);
    assert!(ws.state().history.is_empty());
    assert_eq!(ws.reports.reports().len(), 2);
}

/// Switching modes without finishing is refused; --force switches and leaves the abandoned feature alone.
#[test]
fn mode_conflict_requires_force() {
    let ws = TestWorkspace::new();
    let mut state = state_with_features(&[
        ("half-done", FeatureStatus::Confirmed),
        ("ready", FeatureStatus::StepsDefined),
    ]);
    state.mode = Mode::Steps;
    state.started_at = Some(Utc::now());
    state.current_feature = Some("half-done".to_string());
    ws.seed(&state);

    let err = ws
        .dispatch(&request(ModeName::Implement).feature("ready"))
        .unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::MODE_CONFLICT);
    let state = ws.state();
    assert_eq!(state.mode, Mode::Steps);
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].action, "switch");

    let forced = ws
        .dispatch(
            &request(ModeName::Implement)
                .feature("ready")
                .options(ModeOptions {
                    force: true,
                    ..ModeOptions::default()
                }),
        )
        .expect("forced switch");
    let features = &forced.state.features;
    assert_eq!(features["half-done"].status, FeatureStatus::Confirmed);
    assert_eq!(features["ready"].status, FeatureStatus::Completed);
    assert_eq!(forced.state.mode, Mode::Idle);
    assert_eq!(forced.state.current_feature, None);
}

/// refactor refuses to start on a red baseline and never calls the generator.
#[test]
fn refactor_requires_green_baseline() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::Completed)]));
    ws.validator.script(None, vec![red("2 failed")]);

    let err = ws.dispatch(&request(ModeName::Refactor)).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::BASELINE_NOT_GREEN);
    assert!(ws.generator.requests().is_empty());
    let state = ws.state();
    assert_eq!(state.features["login"].status, FeatureStatus::Completed);
    assert_eq!(state.mode, Mode::Idle);
    assert_eq!(state.history.last().map(|e| e.outcome), Some(Outcome::Failed));
}

/// A red post-check restores every file the refactor touched.
#[test]
fn refactor_rolls_back_on_red_post_check() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::Completed)]));
    fs::create_dir_all(ws.file("src")).expect("mkdir");
    fs::write(ws.file("src/login.rs"), "old\n").expect("write");
    ws.generator.respond(
        Mode::Refactor,
        None,
        proposes(vec![
            ProposedChange::write("src/login.rs", "new\n"),
            ProposedChange::write("src/session.rs", "extracted\n"),
        ]),
    );
    ws.validator
        .script(None, vec![conductor::test_support::green(4), red("broke login")]);

    let err = ws.dispatch(&request(ModeName::Refactor)).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
    assert_eq!(fs::read_to_string(ws.file("src/login.rs")).expect("read"), "old\n");
    assert!(!ws.file("src/session.rs").exists());
    assert_eq!(ws.state().features["login"].status, FeatureStatus::Completed);
}

#[test]
fn refactor_applies_green_restructuring() {
    let ws = TestWorkspace::new();
    ws.seed(&state_with_features(&[("login", FeatureStatus::Completed)]));
    ws.generator.respond(
        Mode::Refactor,
        None,
        proposes(vec![ProposedChange::write("src/session.rs", "extracted\n")]),
    );

    let outcome = ws.dispatch(&request(ModeName::Refactor)).expect("refactor");
    assert_eq!(
        fs::read_to_string(ws.file("src/session.rs")).expect("read"),
        "extracted\n"
    );
    assert_eq!(outcome.state.features["login"].status, FeatureStatus::Completed);
    assert_eq!(ws.validator.calls(), vec![None, None]);
}

/// step_optimize --analyze lists proposals without writing them.
#[test]
fn step_optimize_analyze_writes_nothing() {
    let ws = TestWorkspace::new();
    ws.generator.respond(
        Mode::StepOptimize,
        None,
        proposes(vec![ProposedChange::write(
            "features/step_definitions/common_steps.rs",
            "// merged\n",
        )]),
    );

    let outcome = ws
        .dispatch(&request(ModeName::StepOptimize).options(ModeOptions {
            analyze: true,
            merge: true,
            ..ModeOptions::default()
        }))
        .expect("analyze");
    assert_eq!(outcome.report.mode, ModeName::StepOptimize);
    assert_eq!(outcome.state.history[0].mode, ModeName::StepOptimize);
    assert!(!ws.file("features/step_definitions/common_steps.rs").exists());
    assert_eq!(
        outcome.report.pending,
        vec!["create features/step_definitions/common_steps.rs".to_string()]
    );
    assert_eq!(
        ws.generator.requests()[0].directives,
        vec!["analyze".to_string(), "merge".to_string()]
    );
}

/// step_optimize may not touch business logic.
#[test]
fn step_optimize_cannot_touch_business_logic() {
    let ws = TestWorkspace::new();
    ws.generator.respond(
        Mode::StepOptimize,
        None,
        proposes(vec![ProposedChange::write("src/lib.rs", "// nope\n")]),
    );
    let err = ws.dispatch(&request(ModeName::StepOptimize)).unwrap_err();
    assert!(matches!(err, WorkflowError::ConstraintViolation(_)));
    assert!(!ws.file("src/lib.rs").exists());
}

/// History grows by exactly one entry per audited invocation; option errors leave no trace.
#[test]
fn history_counts_audited_invocations() {
    let ws = TestWorkspace::new();
    ws.dispatch(&request(ModeName::Requirements).feature("cart"))
        .expect("draft");
    ws.dispatch(
        &request(ModeName::Requirements)
            .feature("cart")
            .options(ModeOptions {
                confirm: true,
                ..ModeOptions::default()
            }),
    )
    .expect("confirm");
    ws.dispatch(&request(ModeName::Steps).feature("cart"))
        .expect("steps");
    ws.dispatch(&request(ModeName::Status)).expect("status");
    ws.dispatch(&request(ModeName::Implement).feature("cart"))
        .expect("implement");
    let rejected = ws
        .dispatch(&request(ModeName::Implement).options(ModeOptions {
            hard: true,
            ..ModeOptions::default()
        }))
        .unwrap_err();
    assert!(matches!(rejected, WorkflowError::InvalidInput(_)));

    let state = ws.state();
    let actions: Vec<&str> = state.history.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["create", "confirm", "define_steps", "implement"]);
    assert_eq!(state.features["cart"].status, FeatureStatus::Completed);
    assert!(
        state
            .history
            .iter()
            .all(|entry| entry.feature_id.as_deref() == Some("cart"))
    );
}
