//! Runner settings stored under `.tap-runner/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::Channels;
use crate::core::gate::DEFAULT_COOLDOWN;
use crate::io::executor::{DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_TIMEOUT, ShellExecutor};

/// Relative location of the settings file inside a tutorial workspace.
pub const CONFIG_RELATIVE_PATH: &str = ".tap-runner/config.toml";

/// Runner settings (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerSettings {
    /// Minimum milliseconds between accepted run starts.
    pub cooldown_ms: u64,

    /// Wall-clock budget for one test command, in seconds.
    pub timeout_secs: u64,

    /// Bytes of stdout/stderr kept per stream.
    pub output_limit_bytes: usize,

    /// Prefix for the output channel names, e.g. `"CodeRoad (Tests)"`.
    pub channel_prefix: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            channel_prefix: "CodeRoad".to_string(),
        }
    }
}

impl RunnerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.channel_prefix.trim().is_empty() {
            return Err(anyhow!("channel_prefix must be non-empty"));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn channels(&self) -> Channels {
        Channels::with_prefix(self.channel_prefix.trim())
    }

    pub fn executor(&self) -> ShellExecutor {
        ShellExecutor::new(
            Duration::from_secs(self.timeout_secs),
            self.output_limit_bytes,
        )
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `RunnerSettings::default()`.
pub fn load_config(path: &Path) -> Result<RunnerSettings> {
    if !path.exists() {
        let cfg = RunnerSettings::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerSettings) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
