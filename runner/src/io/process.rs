//! Test command processes: one process group per run, a wall-clock budget and
//! bounded output capture.
//!
//! The test command is a shell line (`npm test -- --reporter=tap`), so the
//! process we spawn is usually a shell whose children do the real work and
//! inherit its stdout/stderr. Killing only the shell on timeout would leave
//! those children holding the pipes open. Every command therefore runs as the
//! leader of its own process group and a timeout kills the whole group.

use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Limits applied to one test command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// What a finished (or killed) test command left behind.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `cmd` until it exits or `limits.timeout` elapses.
///
/// Only spawn and wait failures are errors; a non-zero exit or a timeout is
/// reported through the returned [`CommandOutput`].
#[instrument(skip_all, fields(timeout = ?limits.timeout, output_limit_bytes = limits.output_limit_bytes))]
pub fn run_with_limits(mut cmd: Command, limits: ProcessLimits) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning test command");
    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, "failed to spawn test command");
        anyhow::Error::new(err).context("spawn command")
    })?;

    let capture = OutputCapture::start(&mut child, limits.output_limit_bytes)?;
    let (status, timed_out) = wait_or_kill(&mut child, limits.timeout)?;
    let captured = capture.finish()?;

    if captured.stdout_truncated > 0 || captured.stderr_truncated > 0 {
        warn!(
            stdout_truncated = captured.stdout_truncated,
            stderr_truncated = captured.stderr_truncated,
            "test output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "test command finished");
    Ok(CommandOutput {
        status,
        stdout: captured.stdout,
        stderr: captured.stderr,
        stdout_truncated: captured.stdout_truncated,
        stderr_truncated: captured.stderr_truncated,
        timed_out,
    })
}

/// Wait for the command; past the budget, kill its process group and reap it.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(?timeout, pid = child.id(), "test command timed out, killing process group");
    kill_process_group(child)?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

/// Kill every process in the child's group. The child is not reaped yet, so
/// its pid still names the group.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id()).context("child pid out of range")?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => {
            warn!(%errno, "killpg failed, killing the shell only");
            child.kill().context("kill command")
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Reader threads draining both pipes so a chatty test tool never blocks on a
/// full pipe while we wait on it.
struct OutputCapture {
    stdout: JoinHandle<Result<Stream>>,
    stderr: JoinHandle<Result<Stream>>,
}

#[derive(Debug, Default)]
struct Stream {
    kept: Vec<u8>,
    dropped: usize,
}

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_truncated: usize,
    stderr_truncated: usize,
}

impl OutputCapture {
    fn start(child: &mut Child, limit: usize) -> Result<Self> {
        let stdout: ChildStdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr: ChildStderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        Ok(Self {
            stdout: thread::spawn(move || read_limited(stdout, limit)),
            stderr: thread::spawn(move || read_limited(stderr, limit)),
        })
    }

    /// Returns once every writer of both pipes is gone.
    fn finish(self) -> Result<Captured> {
        let stdout = join_stream(self.stdout).context("join stdout")?;
        let stderr = join_stream(self.stderr).context("join stderr")?;
        Ok(Captured {
            stdout: stdout.kept,
            stderr: stderr.kept,
            stdout_truncated: stdout.dropped,
            stderr_truncated: stderr.dropped,
        })
    }
}

fn join_stream(handle: JoinHandle<Result<Stream>>) -> Result<Stream> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<Stream> {
    let mut stream = Stream::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(stream);
        }
        let keep = n.min(limit.saturating_sub(stream.kept.len()));
        stream.kept.extend_from_slice(&chunk[..keep]);
        stream.dropped += n - keep;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;

    fn limits(timeout_ms: u64, output_limit_bytes: usize) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_millis(timeout_ms),
            output_limit_bytes,
        }
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams_and_exit_status() {
        let output = run_with_limits(sh("echo out; echo err >&2; exit 3"), limits(5_000, 1024))
            .expect("run");
        assert_eq!(output.stdout_lossy(), "out\n");
        assert_eq!(output.stderr_lossy(), "err\n");
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.timed_out);
    }

    #[test]
    fn output_beyond_limit_is_counted_not_kept() {
        let output = run_with_limits(sh("printf 0123456789"), limits(5_000, 4)).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn hung_command_is_killed_at_timeout() {
        let output = run_with_limits(sh("exec sleep 5"), limits(100, 1024)).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_kills_children_of_the_shell() {
        let started = Instant::now();
        let output = run_with_limits(
            sh("echo started; sleep 5; echo done"),
            limits(200, 1024),
        )
        .expect("run");

        assert!(output.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
        assert_eq!(output.stdout_lossy(), "started\n");
    }

    #[test]
    fn timeout_kills_background_jobs_holding_the_pipes() {
        let started = Instant::now();
        let output =
            run_with_limits(sh("sleep 5 & sleep 5 & wait"), limits(200, 1024)).expect("run");

        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_with_limits(
            Command::new("/nonexistent/tap-runner-test-binary"),
            limits(1_000, 1024),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("spawn command"));
    }
}
