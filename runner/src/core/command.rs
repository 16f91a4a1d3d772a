//! Test command construction from runner config and learner position.

use thiserror::Error;

use crate::core::types::Position;
use crate::tutorial::{TestRunnerConfig, Tutorial};

/// The configured command cannot be built for the current position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A filter flag is configured but the step carries no filter token.
    #[error("test filter not configured for level '{level_id}' step '{step_id}'")]
    FilterNotConfigured { level_id: String, step_id: String },
    #[error("test runner command is empty")]
    EmptyCommand,
}

/// Compose the shell command line for one run.
///
/// Appends the TAP flag when configured. When a filter flag is configured the
/// step's filter token is required: running the whole suite instead would
/// report results for tests the learner has not reached.
pub fn build_command(
    config: &TestRunnerConfig,
    position: &Position,
    tutorial: &Tutorial,
) -> Result<String, BuildError> {
    let base = config.command.trim();
    if base.is_empty() {
        return Err(BuildError::EmptyCommand);
    }
    let mut parts = vec![base];

    let Some(args) = &config.args else {
        return Ok(base.to_string());
    };

    let tap = args.tap.trim();
    if !tap.is_empty() {
        parts.push(tap);
    }

    if let Some(filter_arg) = args.filter.as_deref().map(str::trim)
        && !filter_arg.is_empty()
    {
        let token = tutorial
            .find_step(position)
            .and_then(|step| step.filter())
            .ok_or_else(|| BuildError::FilterNotConfigured {
                level_id: position.level_id.clone(),
                step_id: position.step_id.clone(),
            })?;
        parts.push(filter_arg);
        parts.push(token);
    }

    Ok(parts.join(" "))
}

/// Which config field supplied the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySource {
    Directory,
    /// The deprecated `path` field.
    LegacyPath,
}

/// Working directory for the test command, relative to the tutorial root.
///
/// `directory` wins over the deprecated `path`; blank values count as unset.
pub fn resolve_directory(config: &TestRunnerConfig) -> Option<(&str, DirectorySource)> {
    fn non_blank(value: &Option<String>) -> Option<&str> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
    }

    if let Some(dir) = non_blank(&config.directory) {
        return Some((dir, DirectorySource::Directory));
    }
    non_blank(&config.path).map(|dir| (dir, DirectorySource::LegacyPath))
}
