//! Orchestration of one test run: gate, build, execute, classify, dispatch.
//!
//! [`TestRunner::run`] may be called concurrently from any number of
//! triggers. It never blocks other callers; instead the [`RateGate`] drops
//! starts that come too quickly and [`RunSlot::is_current`] drops completions
//! that a newer accepted run has superseded. Every accepted, non-superseded
//! run ends in exactly one terminal callback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{Channels, RunMode, classify};
use crate::core::command::{BuildError, DirectorySource, build_command, resolve_directory};
use crate::core::gate::{Clock, DEFAULT_COOLDOWN, RateGate, RunSlot, SystemClock};
use crate::core::tap;
use crate::core::types::{
    FailSummary, Outcome, OutcomeKind, Position, RawProcessResult, TestSummary,
};
use crate::io::config::RunnerSettings;
use crate::io::executor::{ExecRequest, ProcessExecutor};
use crate::io::sink::{OutputSink, TerminalSink, apply_effects};
use crate::io::telemetry::{Telemetry, TracingTelemetry};
use crate::tutorial::Tutorial;

/// Host-facing notifications for a run, all keyed by the triggering position.
pub trait Callbacks: Send + Sync {
    /// Run accepted and started (visible runs only).
    fn on_run(&self, position: &Position);
    fn on_success(&self, position: &Position);
    fn on_fail(&self, position: &Position, fail: &FailSummary);
    fn on_error(&self, position: &Position);
    /// Sub-task probe result.
    fn on_load_subtasks(&self, summary: &TestSummary);
}

/// Route an [`Outcome`] to the matching callback.
pub fn dispatch<C: Callbacks + ?Sized>(outcome: &Outcome, callbacks: &C) {
    match outcome {
        Outcome::Running { position } => callbacks.on_run(position),
        Outcome::Success { position } => callbacks.on_success(position),
        Outcome::Fail { position, fail } => callbacks.on_fail(position, fail),
        Outcome::Error { position } => callbacks.on_error(position),
        Outcome::SubtaskSummary { summary } => callbacks.on_load_subtasks(summary),
    }
}

/// Forward outcomes into a channel; a closed receiver is ignored.
impl Callbacks for UnboundedSender<Outcome> {
    fn on_run(&self, position: &Position) {
        let _ = self.send(Outcome::Running {
            position: position.clone(),
        });
    }

    fn on_success(&self, position: &Position) {
        let _ = self.send(Outcome::Success {
            position: position.clone(),
        });
    }

    fn on_fail(&self, position: &Position, fail: &FailSummary) {
        let _ = self.send(Outcome::Fail {
            position: position.clone(),
            fail: fail.clone(),
        });
    }

    fn on_error(&self, position: &Position) {
        let _ = self.send(Outcome::Error {
            position: position.clone(),
        });
    }

    fn on_load_subtasks(&self, summary: &TestSummary) {
        let _ = self.send(Outcome::SubtaskSummary {
            summary: summary.clone(),
        });
    }
}

/// Called after the success callback of the request that carried it.
pub type SuccessHook = Box<dyn FnOnce() + Send>;

/// One trigger's request to run the tests.
pub struct RunRequest {
    pub position: Position,
    pub mode: RunMode,
    pub on_success: Option<SuccessHook>,
}

impl RunRequest {
    /// A run that drives the visible running/success/fail state.
    pub fn visible(position: Position) -> Self {
        Self {
            position,
            mode: RunMode::Visible,
            on_success: None,
        }
    }

    /// A sub-task probe: reports only the per-test summary.
    pub fn subtasks(position: Position) -> Self {
        Self {
            position,
            mode: RunMode::SubtaskProbe,
            on_success: None,
        }
    }

    pub fn with_on_success(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }
}

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDisposition {
    /// Arrived inside the cool-down window; nothing ran.
    RateLimited,
    /// Finished after a newer run was accepted; result dropped.
    Stale,
    /// Terminal outcome delivered to the callbacks.
    Delivered(OutcomeKind),
}

/// Runs the tutorial's test command for one session's single run slot.
pub struct TestRunner<E, C> {
    tutorial: Tutorial,
    root: PathBuf,
    executor: E,
    callbacks: C,
    sink: Arc<dyn OutputSink>,
    telemetry: Arc<dyn Telemetry>,
    channels: Channels,
    clock: Arc<dyn Clock>,
    slot: Arc<RunSlot>,
    gate: RateGate,
}

impl<E: ProcessExecutor, C: Callbacks> TestRunner<E, C> {
    /// Create a runner for the tutorial workspace at `root`.
    ///
    /// Defaults: terminal sink, tracing telemetry, system clock, 300 ms
    /// cool-down.
    pub fn new(tutorial: Tutorial, root: impl Into<PathBuf>, executor: E, callbacks: C) -> Self {
        let slot = Arc::new(RunSlot::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gate = RateGate::new(slot.clone(), DEFAULT_COOLDOWN, clock.clone());
        Self {
            tutorial,
            root: root.into(),
            executor,
            callbacks,
            sink: Arc::new(TerminalSink::stdout()),
            telemetry: Arc::new(TracingTelemetry),
            channels: Channels::default(),
            clock,
            slot,
            gate,
        }
    }

    /// Apply cool-down and channel names from settings.
    pub fn with_settings(self, settings: &RunnerSettings) -> Self {
        self.with_cooldown(settings.cooldown())
            .with_channels(settings.channels())
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_channels(mut self, channels: Channels) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_cooldown(mut self, window: Duration) -> Self {
        self.gate = RateGate::new(self.slot.clone(), window, self.clock.clone());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.gate = RateGate::new(self.slot.clone(), self.gate.window(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn slot(&self) -> &Arc<RunSlot> {
        &self.slot
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run the tests for one request.
    ///
    /// Never fails: build and execution errors become an `Error` outcome, and
    /// gate rejections are silent. Only the executor call suspends.
    #[instrument(skip_all, fields(level = %request.position.level_id, step = %request.position.step_id, mode = ?request.mode))]
    pub async fn run(&self, request: RunRequest) -> RunDisposition {
        let Some(token) = self.gate.try_start() else {
            debug!("run rate limited");
            return RunDisposition::RateLimited;
        };
        info!(token = token.sequence(), "run accepted");

        let RunRequest {
            position,
            mode,
            on_success,
        } = request;

        if mode == RunMode::Visible {
            self.callbacks.on_run(&position);
        }

        let executed = self.execute(&position).await;

        if !self.slot.is_current(token) {
            debug!(token = token.sequence(), "dropping superseded run result");
            return RunDisposition::Stale;
        }

        let raw = match executed {
            Ok(raw) => raw,
            Err(err) => {
                let err = anyhow::Error::new(err);
                self.telemetry.report(&err);
                RawProcessResult::from_failure(format!("{err:#}"))
            }
        };

        let parsed = tap::parse(raw.stdout_text());
        let classification = classify(&position, &raw, &parsed, mode, &self.channels);

        apply_effects(self.sink.as_ref(), &classification.effects);
        if let Some(fault) = &classification.fault {
            self.telemetry.report(&anyhow!("{fault}"));
        }

        let kind = classification.outcome.kind();
        dispatch(&classification.outcome, &self.callbacks);
        if kind == OutcomeKind::Success
            && let Some(hook) = on_success
        {
            hook();
        }

        info!(outcome = ?kind, "run finished");
        RunDisposition::Delivered(kind)
    }

    /// Build and execute the test command. Execution failures are folded into
    /// a [`RawProcessResult`] with the detail on stderr; a build error is
    /// returned untouched so it is reported only if the run is still current.
    async fn execute(&self, position: &Position) -> Result<RawProcessResult, BuildError> {
        let config = &self.tutorial.config.test_runner;
        let command = build_command(config, position, &self.tutorial)?;

        let request = ExecRequest {
            command,
            workdir: self.workdir(),
        };
        debug!(command = %request.command, workdir = %request.workdir.display(), "running test command");
        match self.executor.execute(&request).await {
            Ok(raw) => Ok(raw),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "test command could not run");
                Ok(RawProcessResult::from_failure(format!("{err:#}")))
            }
        }
    }

    fn workdir(&self) -> PathBuf {
        match resolve_directory(&self.tutorial.config.test_runner) {
            Some((dir, source)) => {
                if source == DirectorySource::LegacyPath {
                    warn!(path = dir, "testRunner.path is deprecated, use testRunner.directory");
                }
                join_workdir(&self.root, dir)
            }
            None => self.root.clone(),
        }
    }
}

fn join_workdir(root: &Path, dir: &str) -> PathBuf {
    let dir = Path::new(dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}
