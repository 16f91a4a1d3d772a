//! Tutorial test runner CLI.
//!
//! Runs a tutorial step's tests once (`run`), previews sub-task status
//! (`run --subtasks`) or re-runs on every file save (`watch`). Outcomes are
//! printed as JSON lines on stdout; failure reports appear on stdout under a
//! channel header.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tap_runner::core::types::{Outcome, OutcomeKind, Position};
use tap_runner::exit_codes;
use tap_runner::io::config::{CONFIG_RELATIVE_PATH, RunnerSettings, load_config, write_config};
use tap_runner::io::sink::TerminalSink;
use tap_runner::io::tutorial_store::load_tutorial;
use tap_runner::io::watch::watch_and_run;
use tap_runner::logging;
use tap_runner::orchestrate::{RunDisposition, RunRequest, TestRunner};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "tap-runner",
    version,
    about = "Run tutorial tests and classify their TAP output"
)]
struct Cli {
    /// Tutorial workspace root (holds `.tap-runner/config.toml`).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `.tap-runner/config.toml` with default settings if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the tests for one step and print the outcome.
    Run {
        #[command(flatten)]
        target: Target,
        /// Only report per-test pass/fail (sub-task preview).
        #[arg(long)]
        subtasks: bool,
    },
    /// Re-run the tests for one step whenever workspace files change.
    Watch {
        #[command(flatten)]
        target: Target,
        /// Filesystem poll interval in milliseconds.
        #[arg(long, default_value_t = 200)]
        poll_ms: u64,
    },
}

#[derive(Args)]
struct Target {
    /// Tutorial JSON file.
    #[arg(long, default_value = "tutorial.json")]
    tutorial: PathBuf,
    #[arg(long)]
    level: String,
    #[arg(long)]
    stage: Option<String>,
    #[arg(long)]
    step: String,
}

impl Target {
    fn position(&self) -> Position {
        let position = Position::new(&self.level, &self.step);
        match &self.stage {
            Some(stage) => position.with_stage(stage),
            None => position,
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Run { target, subtasks } => cmd_run(&cli.root, &target, subtasks).await,
        Command::Watch { target, poll_ms } => {
            cmd_watch(&cli.root, &target, Duration::from_millis(poll_ms)).await
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = root.join(CONFIG_RELATIVE_PATH);
    if force || !path.exists() {
        write_config(&path, &RunnerSettings::default())?;
    }
    Ok(exit_codes::OK)
}

async fn cmd_run(root: &Path, target: &Target, subtasks: bool) -> Result<i32> {
    let settings = load_config(&root.join(CONFIG_RELATIVE_PATH))?;
    let tutorial = load_tutorial(&resolve(root, &target.tutorial))?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = TestRunner::new(tutorial, root, settings.executor(), tx)
        .with_settings(&settings)
        .with_sink(Arc::new(TerminalSink::stdout()));

    let position = target.position();
    let request = if subtasks {
        RunRequest::subtasks(position)
    } else {
        RunRequest::visible(position)
    };
    let disposition = runner.run(request).await;
    drop(runner);

    while let Some(outcome) = rx.recv().await {
        if outcome.kind().is_terminal() {
            print_outcome(&outcome)?;
        }
    }

    Ok(match disposition {
        RunDisposition::Delivered(kind) => exit_code_for(kind),
        RunDisposition::RateLimited | RunDisposition::Stale => exit_codes::ERROR,
    })
}

async fn cmd_watch(root: &Path, target: &Target, poll_interval: Duration) -> Result<i32> {
    let settings = load_config(&root.join(CONFIG_RELATIVE_PATH))?;
    let tutorial = load_tutorial(&resolve(root, &target.tutorial))?;
    let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
    let runner = Arc::new(
        TestRunner::new(tutorial, root, settings.executor(), tx)
            .with_settings(&settings)
            .with_sink(Arc::new(TerminalSink::stdout())),
    );

    tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            if let Err(err) = print_outcome(&outcome) {
                tracing::warn!(err = %err, "failed to print outcome");
            }
        }
    });

    watch_and_run(runner, root.to_path_buf(), target.position(), poll_interval).await?;
    Ok(exit_codes::OK)
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn print_outcome(outcome: &Outcome) -> Result<()> {
    let line = serde_json::to_string(outcome).context("serialize outcome")?;
    println!("{line}");
    Ok(())
}

fn exit_code_for(kind: OutcomeKind) -> i32 {
    match kind {
        OutcomeKind::Success | OutcomeKind::SubtaskSummary | OutcomeKind::Running => exit_codes::OK,
        OutcomeKind::Fail => exit_codes::FAIL,
        OutcomeKind::Error => exit_codes::ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["tap-runner", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_with_stage_and_subtasks() {
        let cli = Cli::parse_from([
            "tap-runner",
            "--root",
            "/work",
            "run",
            "--level",
            "L1",
            "--stage",
            "S1",
            "--step",
            "L1S1",
            "--subtasks",
        ]);
        assert_eq!(cli.root, PathBuf::from("/work"));
        match cli.command {
            Command::Run { target, subtasks } => {
                assert!(subtasks);
                assert_eq!(target.tutorial, PathBuf::from("tutorial.json"));
                assert_eq!(
                    target.position(),
                    Position::new("L1", "L1S1").with_stage("S1")
                );
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_watch_defaults_poll_interval() {
        let cli = Cli::parse_from(["tap-runner", "watch", "--level", "L1", "--step", "L1S2"]);
        assert!(matches!(cli.command, Command::Watch { poll_ms: 200, .. }));
    }

    #[test]
    fn outcome_kinds_map_to_exit_codes() {
        assert_eq!(exit_code_for(OutcomeKind::Success), exit_codes::OK);
        assert_eq!(exit_code_for(OutcomeKind::SubtaskSummary), exit_codes::OK);
        assert_eq!(exit_code_for(OutcomeKind::Fail), exit_codes::FAIL);
        assert_eq!(exit_code_for(OutcomeKind::Error), exit_codes::ERROR);
    }
}
