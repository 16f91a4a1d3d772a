use serde::{Deserialize, Serialize};

use crate::core::types::Position;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tutorial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub config: TutorialConfig,
    #[serde(default)]
    pub levels: Vec<Level>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TutorialConfig {
    pub test_runner: TestRunnerConfig,
}

/// How to invoke the tutorial's test tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunnerConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<TestRunnerArgs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Deprecated alias for `directory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunnerArgs {
    /// Flag forcing TAP output (e.g. `--reporter=tap`).
    #[serde(default)]
    pub tap: String,
    /// Flag preceding a step's filter token (e.g. `--grep`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Level {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<StepSetup>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSetup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Tutorial {
    /// Find the step a position points at (level id, then step id).
    pub fn find_step(&self, position: &Position) -> Option<&Step> {
        self.levels
            .iter()
            .find(|level| level.id == position.level_id)?
            .steps
            .iter()
            .find(|step| step.id == position.step_id)
    }
}

impl Step {
    pub fn filter(&self) -> Option<&str> {
        self.setup
            .as_ref()
            .and_then(|setup| setup.filter.as_deref())
            .filter(|filter| !filter.trim().is_empty())
    }
}
