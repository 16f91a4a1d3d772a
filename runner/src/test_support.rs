//! Test-only fakes for the run pipeline's collaborators.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tokio::sync::{Notify, oneshot};

use crate::core::classifier::ChannelEffect;
use crate::core::gate::Clock;
use crate::core::types::{FailSummary, Outcome, Position, RawProcessResult, TestSummary};
use crate::io::executor::{ExecRequest, ProcessExecutor};
use crate::io::sink::OutputSink;
use crate::io::telemetry::Telemetry;
use crate::orchestrate::Callbacks;
use crate::tutorial::{
    Level, Step, StepSetup, TestRunnerArgs, TestRunnerConfig, Tutorial, TutorialConfig,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}

/// One scripted executor response.
pub struct ScriptedRun {
    result: Result<RawProcessResult, String>,
    release: Option<oneshot::Receiver<()>>,
}

impl ScriptedRun {
    /// Completes immediately with the given streams (empty means absent).
    pub fn output(stdout: &str, stderr: &str) -> Self {
        Self {
            result: Ok(RawProcessResult {
                stdout: (!stdout.is_empty()).then(|| stdout.to_string()),
                stderr: (!stderr.is_empty()).then(|| stderr.to_string()),
            }),
            release: None,
        }
    }

    /// Fails as if the process could not be spawned.
    pub fn spawn_error(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            release: None,
        }
    }

    /// Hold the response until the returned sender fires (or is dropped).
    pub fn held(self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                release: Some(rx),
                ..self
            },
            tx,
        )
    }
}

/// Executor returning queued responses in call order.
pub struct ScriptedExecutor {
    runs: Mutex<VecDeque<ScriptedRun>>,
    calls: Mutex<Vec<ExecRequest>>,
    called: Notify,
}

impl ScriptedExecutor {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            calls: Mutex::new(Vec::new()),
            called: Notify::new(),
        }
    }

    pub fn calls(&self) -> Vec<ExecRequest> {
        lock(&self.calls).clone()
    }

    /// Wait until at least `count` executions have started.
    pub async fn wait_for_calls(&self, count: usize) {
        while lock(&self.calls).len() < count {
            self.called.notified().await;
        }
    }
}

impl ProcessExecutor for ScriptedExecutor {
    async fn execute(&self, request: &ExecRequest) -> Result<RawProcessResult> {
        let next = lock(&self.runs).pop_front();
        lock(&self.calls).push(request.clone());
        self.called.notify_one();

        let Some(run) = next else {
            return Err(anyhow!("no scripted run left for `{}`", request.command));
        };
        if let Some(release) = run.release {
            let _ = release.await;
        }
        run.result.map_err(|message| anyhow!(message))
    }
}

/// Callbacks that record every outcome in order.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingCallbacks {
    pub fn outcomes(&self) -> Vec<Outcome> {
        lock(&self.outcomes).clone()
    }

    /// Outcomes that end a run (everything but `Running`).
    pub fn terminal(&self) -> Vec<Outcome> {
        self.outcomes()
            .into_iter()
            .filter(|outcome| outcome.kind().is_terminal())
            .collect()
    }

    fn push(&self, outcome: Outcome) {
        lock(&self.outcomes).push(outcome);
    }
}

impl Callbacks for RecordingCallbacks {
    fn on_run(&self, position: &Position) {
        self.push(Outcome::Running {
            position: position.clone(),
        });
    }

    fn on_success(&self, position: &Position) {
        self.push(Outcome::Success {
            position: position.clone(),
        });
    }

    fn on_fail(&self, position: &Position, fail: &FailSummary) {
        self.push(Outcome::Fail {
            position: position.clone(),
            fail: fail.clone(),
        });
    }

    fn on_error(&self, position: &Position) {
        self.push(Outcome::Error {
            position: position.clone(),
        });
    }

    fn on_load_subtasks(&self, summary: &TestSummary) {
        self.push(Outcome::SubtaskSummary {
            summary: summary.clone(),
        });
    }
}

/// Sink that records every channel effect.
#[derive(Debug, Default)]
pub struct RecordingSink {
    effects: Mutex<Vec<ChannelEffect>>,
}

impl RecordingSink {
    pub fn effects(&self) -> Vec<ChannelEffect> {
        lock(&self.effects).clone()
    }

    /// Texts written to `channel` with `show = true`.
    pub fn shown(&self, channel: &str) -> Vec<String> {
        self.effects()
            .into_iter()
            .filter_map(|effect| match effect {
                ChannelEffect::Write {
                    channel: written,
                    text,
                    show: true,
                } if written == channel => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Every write (shown or hidden) to `channel`.
    pub fn writes(&self, channel: &str) -> Vec<String> {
        self.effects()
            .into_iter()
            .filter_map(|effect| match effect {
                ChannelEffect::Write {
                    channel: written,
                    text,
                    ..
                } if written == channel => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn write(&self, channel: &str, text: &str, show: bool) {
        lock(&self.effects).push(ChannelEffect::Write {
            channel: channel.to_string(),
            text: text.to_string(),
            show,
        });
    }

    fn clear(&self, channel: &str) {
        lock(&self.effects).push(ChannelEffect::Clear {
            channel: channel.to_string(),
        });
    }
}

/// Telemetry that keeps reported errors as strings.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    reports: Mutex<Vec<String>>,
}

impl RecordingTelemetry {
    pub fn reports(&self) -> Vec<String> {
        lock(&self.reports).clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn report(&self, error: &anyhow::Error) {
        lock(&self.reports).push(format!("{error:#}"));
    }
}

/// Runner config with a TAP flag and an optional filter flag.
pub fn runner_config(command: &str, tap: &str, filter: Option<&str>) -> TestRunnerConfig {
    TestRunnerConfig {
        command: command.to_string(),
        args: Some(TestRunnerArgs {
            tap: tap.to_string(),
            filter: filter.map(str::to_string),
        }),
        directory: None,
        path: None,
    }
}

/// Tutorial with a single level `L1` holding `(step id, filter token)` steps.
pub fn tutorial_with_config(config: TestRunnerConfig, steps: &[(&str, Option<&str>)]) -> Tutorial {
    Tutorial {
        id: Some("test-tutorial".to_string()),
        config: TutorialConfig {
            test_runner: config,
        },
        levels: vec![Level {
            id: "L1".to_string(),
            steps: steps
                .iter()
                .map(|(id, filter)| Step {
                    id: (*id).to_string(),
                    setup: Some(StepSetup {
                        filter: filter.map(str::to_string),
                    }),
                })
                .collect(),
        }],
    }
}

/// [`tutorial_with_config`] with a plain `npm test --tap` runner.
pub fn tutorial_with_steps(steps: &[(&str, Option<&str>)]) -> Tutorial {
    tutorial_with_config(runner_config("npm test", "--tap", None), steps)
}

/// Temporary tutorial workspace with `tutorial.json` and runner settings.
#[cfg(feature = "test-support")]
pub struct TestWorkspace {
    temp: tempfile::TempDir,
}

#[cfg(feature = "test-support")]
impl TestWorkspace {
    pub fn new(tutorial: &Tutorial, settings: &crate::io::config::RunnerSettings) -> Result<Self> {
        use crate::io::config::{CONFIG_RELATIVE_PATH, write_config};

        let temp = tempfile::tempdir()?;
        let mut buf = serde_json::to_string_pretty(tutorial)?;
        buf.push('\n');
        std::fs::write(temp.path().join("tutorial.json"), buf)?;
        write_config(&temp.path().join(CONFIG_RELATIVE_PATH), settings)?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp.path()
    }

    pub fn tutorial_path(&self) -> std::path::PathBuf {
        self.temp.path().join("tutorial.json")
    }
}
