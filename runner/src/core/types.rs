//! Shared deterministic types for the run pipeline.
//!
//! These types define stable contracts between the gates, the classifier and
//! the callback dispatch. They carry no I/O handles and serialize to the same
//! camelCase shape the tutorial data uses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Test name → passed, ordered by name for stable output.
pub type TestSummary = BTreeMap<String, bool>;

/// Where the learner currently is in the tutorial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub level_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    pub step_id: String,
}

impl Position {
    pub fn new(level_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            level_id: level_id.into(),
            stage_id: None,
            step_id: step_id.into(),
        }
    }

    pub fn with_stage(mut self, stage_id: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id.into());
        self
    }
}

/// Captured output of one test command invocation.
///
/// Execution failures are folded into this same shape: `stdout` keeps whatever
/// partial output existed and `stderr` carries the failure detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProcessResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl RawProcessResult {
    /// Result for a run that never produced output (spawn or build failure).
    pub fn from_failure(detail: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: Some(detail.into()),
        }
    }

    /// Stdout, treating `None` as empty.
    pub fn stdout_text(&self) -> &str {
        self.stdout.as_deref().unwrap_or("")
    }

    /// Stderr, treating `None` as empty.
    pub fn stderr_text(&self) -> &str {
        self.stderr.as_deref().unwrap_or("")
    }
}

/// One failing assertion reported by the test tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Structured view of the test tool's stdout.
///
/// `ok` implies `failed` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResult {
    pub ok: bool,
    pub failed: Vec<TestFailure>,
    pub summary: TestSummary,
    pub logs: Vec<String>,
}

/// Payload delivered with a failing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailSummary {
    pub title: String,
    pub description: String,
    pub summary: TestSummary,
}

/// Classified result of a run, delivered to the host through [`Callbacks`].
///
/// [`Callbacks`]: crate::orchestrate::Callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Running { position: Position },
    Success { position: Position },
    Fail { position: Position, fail: FailSummary },
    Error { position: Position },
    SubtaskSummary { summary: TestSummary },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Running { .. } => OutcomeKind::Running,
            Outcome::Success { .. } => OutcomeKind::Success,
            Outcome::Fail { .. } => OutcomeKind::Fail,
            Outcome::Error { .. } => OutcomeKind::Error,
            Outcome::SubtaskSummary { .. } => OutcomeKind::SubtaskSummary,
        }
    }
}

/// Discriminant of [`Outcome`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Running,
    Success,
    Fail,
    Error,
    SubtaskSummary,
}

impl OutcomeKind {
    /// True for every kind that ends a run.
    pub fn is_terminal(self) -> bool {
        !matches!(self, OutcomeKind::Running)
    }
}
