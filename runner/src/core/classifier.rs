//! Classification of a finished test run into exactly one [`Outcome`].
//!
//! Pure: the classifier only decides. The orchestrator applies the returned
//! channel effects, reports the fault (if any) and dispatches the outcome.

use crate::core::report::format_fail_output;
use crate::core::types::{FailSummary, Outcome, ParsedResult, Position, RawProcessResult};

pub const DEFAULT_FAIL_TITLE: &str = "Test Failed";
pub const DEFAULT_FAIL_DESCRIPTION: &str = "Unknown error";

/// Output channel names for one tutorial session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    /// Failure reports and raw stderr; shown to the learner.
    pub tests: String,
    /// Log lines captured from the test output; written hidden.
    pub logs: String,
}

impl Channels {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            tests: format!("{prefix} (Tests)"),
            logs: format!("{prefix} (Logs)"),
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::with_prefix("CodeRoad")
    }
}

/// Side effect on an output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEffect {
    Write {
        channel: String,
        text: String,
        show: bool,
    },
    Clear {
        channel: String,
    },
}

/// Everything a finished run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Applied in order, before the outcome is dispatched.
    pub effects: Vec<ChannelEffect>,
    /// Internal fault worth reporting to telemetry.
    pub fault: Option<String>,
}

/// Whether a request drives the visible run state or only previews sub-tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Visible,
    SubtaskProbe,
}

/// Map process output and its parse to an outcome.
///
/// Order matters:
/// 1. probes only report the summary,
/// 2. logs always go to the hidden log channel,
/// 3. any stderr is a `Fail` when stdout parsed into a failing run, else `Error`,
/// 4. a clean parse is `Success`,
/// 5. a failing parse with no stderr is an internal fault surfaced as `Error`.
///
/// The test tool writes to stderr on assertion failures and on crashes alike;
/// a concrete parsed failure is what tells them apart, not the exit code.
pub fn classify(
    position: &Position,
    raw: &RawProcessResult,
    parsed: &ParsedResult,
    mode: RunMode,
    channels: &Channels,
) -> Classification {
    if mode == RunMode::SubtaskProbe {
        return Classification {
            outcome: Outcome::SubtaskSummary {
                summary: parsed.summary.clone(),
            },
            effects: Vec::new(),
            fault: None,
        };
    }

    let mut effects = vec![ChannelEffect::Write {
        channel: channels.logs.clone(),
        text: parsed.logs.join("\n"),
        show: false,
    }];

    let stdout = raw.stdout_text();
    let stderr = raw.stderr_text();

    if !stderr.is_empty() {
        if !stdout.is_empty() && !parsed.ok {
            let first = parsed.failed.first();
            let title = first
                .map(|fail| fail.message.as_str())
                .filter(|message| !message.is_empty())
                .unwrap_or(DEFAULT_FAIL_TITLE);
            let description = first
                .and_then(|fail| fail.details.as_deref())
                .filter(|details| !details.is_empty())
                .unwrap_or(DEFAULT_FAIL_DESCRIPTION);
            effects.push(ChannelEffect::Write {
                channel: channels.tests.clone(),
                text: format_fail_output(parsed),
                show: true,
            });
            return Classification {
                outcome: Outcome::Fail {
                    position: position.clone(),
                    fail: FailSummary {
                        title: title.to_string(),
                        description: description.to_string(),
                        summary: parsed.summary.clone(),
                    },
                },
                effects,
                fault: None,
            };
        }

        effects.push(ChannelEffect::Write {
            channel: channels.tests.clone(),
            text: stderr.to_string(),
            show: true,
        });
        return Classification {
            outcome: Outcome::Error {
                position: position.clone(),
            },
            effects,
            fault: None,
        };
    }

    if parsed.ok {
        effects.push(ChannelEffect::Clear {
            channel: channels.tests.clone(),
        });
        return Classification {
            outcome: Outcome::Success {
                position: position.clone(),
            },
            effects,
            fault: None,
        };
    }

    Classification {
        outcome: Outcome::Error {
            position: position.clone(),
        },
        effects,
        fault: Some(format!(
            "test run reported failure without stderr (level '{}', step '{}')",
            position.level_id, position.step_id
        )),
    }
}
