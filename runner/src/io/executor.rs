//! Process executor abstraction for the test command.
//!
//! The [`ProcessExecutor`] trait decouples run orchestration from actually
//! spawning processes. Tests use scripted executors that return predetermined
//! output, optionally held back until released, without spawning anything.

use std::future::Future;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::types::RawProcessResult;
use crate::io::process::{CommandOutput, ProcessLimits, run_with_limits};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// One test command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Full shell command line.
    pub command: String,
    /// Working directory for the command.
    pub workdir: PathBuf,
}

/// Runs test commands.
///
/// A non-zero exit is not an error: it comes back as a [`RawProcessResult`]
/// with the failure detail on stderr. `Err` is reserved for commands that
/// could not be run at all; callers fold it into the same shape.
pub trait ProcessExecutor: Send + Sync {
    fn execute(
        &self,
        request: &ExecRequest,
    ) -> impl Future<Output = Result<RawProcessResult>> + Send;
}

/// Executor that runs the command through `sh -c` on a blocking thread.
#[derive(Debug, Clone, Copy)]
pub struct ShellExecutor {
    pub limits: ProcessLimits,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            limits: ProcessLimits {
                timeout: DEFAULT_TIMEOUT,
                output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            },
        }
    }
}

impl ShellExecutor {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            limits: ProcessLimits {
                timeout,
                output_limit_bytes,
            },
        }
    }
}

impl ProcessExecutor for ShellExecutor {
    #[instrument(skip_all, fields(command = %request.command))]
    async fn execute(&self, request: &ExecRequest) -> Result<RawProcessResult> {
        let request = request.clone();
        let limits = self.limits;
        tokio::task::spawn_blocking(move || run_shell(&request, limits))
            .await
            .context("join test command task")?
    }
}

fn run_shell(request: &ExecRequest, limits: ProcessLimits) -> Result<RawProcessResult> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&request.command)
        .current_dir(&request.workdir);
    let output = run_with_limits(cmd, limits)
        .with_context(|| format!("run test command `{}`", request.command))?;
    Ok(to_raw_result(&request.command, &output, limits.timeout))
}

/// Fold a finished process into stdout/stderr text.
///
/// A timeout or non-zero exit always leaves a non-empty stderr, even when the
/// tool printed nothing there, so the classifier never mistakes it for a
/// clean run.
pub fn to_raw_result(command: &str, output: &CommandOutput, timeout: Duration) -> RawProcessResult {
    let stdout = output.stdout_lossy();
    let mut stderr = output.stderr_lossy();

    if output.timed_out {
        warn!(?timeout, "test command timed out");
        stderr = format!("test command timed out after {timeout:?}: {command}\n{stderr}");
    } else if !output.status.success() {
        debug!(exit_code = ?output.status.code(), "test command exited non-zero");
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        stderr = format!("Command failed ({code}): {command}\n{stderr}");
    }

    if output.stderr_truncated > 0 {
        stderr.push_str(&format!(
            "\n[stderr truncated {} bytes]\n",
            output.stderr_truncated
        ));
    }

    RawProcessResult {
        stdout: (!stdout.is_empty()).then_some(stdout),
        stderr: (!stderr.is_empty()).then_some(stderr),
    }
}
