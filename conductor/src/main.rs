//! Single-role workflow conductor.
//!
//! Runs one mode per invocation against the workspace state in
//! `.conductor/state.json`, prints the mode report, and exits with a stable
//! code per failure kind (see `exit_codes`).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use conductor::core::types::ModeName;
use conductor::dispatch::{DefaultCollaborators, DispatchRequest, dispatch};
use conductor::error::WorkflowError;
use conductor::exit_codes;
use conductor::io::config::load_config;
use conductor::io::paths::WorkspacePaths;
use conductor::logging;
use conductor::modes::ModeOptions;

#[derive(Parser, Debug)]
#[command(
    name = "conductor",
    version,
    about = "Single-role workflow conductor for behavior-driven development"
)]
struct Cli {
    /// Mode to run: requirements, steps, implement, refactor, step_optimize, status, reset.
    mode: String,
    /// Feature id to target.
    feature: Option<String>,
    /// Process every eligible feature (steps, implement).
    #[arg(long)]
    all: bool,
    /// Re-enter failed features (implement); list them as next work (status).
    #[arg(long)]
    retry: bool,
    /// Switch away from an unfinished mode, or re-open finished features (implement).
    #[arg(long)]
    force: bool,
    /// Narrow validation and generation (refactor, step_optimize).
    #[arg(long)]
    scope: Option<String>,
    /// Drop every feature record and the history (reset).
    #[arg(long)]
    hard: bool,
    /// Rebuild records from documents (requirements) or propose without writing.
    #[arg(long)]
    analyze: bool,
    /// Ask the step optimizer to merge duplicate steps.
    #[arg(long)]
    merge: bool,
    /// Ask the step optimizer to generalize similar steps.
    #[arg(long)]
    generalize: bool,
    /// Confirm a drafted specification (requirements).
    #[arg(long)]
    confirm: bool,
    /// Human-confirmed rewrite of a confirmed specification (requirements).
    #[arg(long = "human-override")]
    human_override: bool,
    /// Capture a workflow context value, `key=value` (requirements; repeatable).
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context)]
    context: Vec<(String, String)>,
    /// Workspace root (defaults to the current directory).
    #[arg(long)]
    root: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> ModeOptions {
        ModeOptions {
            all: self.all,
            retry: self.retry,
            force: self.force,
            scope: self.scope.clone(),
            hard: self.hard,
            analyze: self.analyze,
            merge: self.merge,
            generalize: self.generalize,
            confirm: self.confirm,
            human_override: self.human_override,
            context: self.context.clone(),
        }
    }
}

fn parse_context(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32, WorkflowError> {
    let mode: ModeName = cli.mode.parse()?;
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let paths = WorkspacePaths::new(root);
    let config = load_config(&paths.config_path)?;
    let collaborators = DefaultCollaborators::new(&paths, &config);
    let request = DispatchRequest {
        mode,
        feature: cli.feature.clone(),
        options: cli.options(),
    };

    let outcome = dispatch(&paths, &config, &request, collaborators.borrow())?;
    print!("{}", outcome.report.rendered);
    if outcome.report.failed().is_empty() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::VALIDATION_FAILURE)
    }
}
