//! Tutorial data loading with schema validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::tutorial::Tutorial;

pub const TUTORIAL_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/tutorial.schema.json"
));

/// Load a tutorial JSON file, validating it against the embedded schema.
pub fn load_tutorial(path: &Path) -> Result<Tutorial> {
    debug!(path = %path.display(), "loading tutorial");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read tutorial {}", path.display()))?;
    parse_tutorial(&contents).with_context(|| format!("load tutorial {}", path.display()))
}

/// Parse and validate tutorial JSON text.
pub fn parse_tutorial(contents: &str) -> Result<Tutorial> {
    let value: Value = serde_json::from_str(contents).context("parse tutorial json")?;
    validate_schema(&value)?;
    let tutorial: Tutorial = serde_json::from_value(value).context("deserialize tutorial")?;
    Ok(tutorial)
}

fn validate_schema(tutorial: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TUTORIAL_SCHEMA).context("parse tutorial schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(tutorial) {
        let messages = compiled
            .iter_errors(tutorial)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "tutorial schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Position;

    const TUTORIAL: &str = r#"{
        "id": "fcc-learn-npm",
        "config": {
            "testRunner": {
                "command": "npm run programmatic-test",
                "args": { "tap": "--reporter=mocha-tap-reporter", "filter": "--grep" },
                "directory": "coderoad"
            },
            "repo": { "uri": "https://example.invalid/repo.git", "branch": "v1" }
        },
        "levels": [
            {
                "id": "L1",
                "title": "Intro",
                "steps": [
                    { "id": "L1S1", "setup": { "filter": "L1S1Q", "commits": ["abc"] } },
                    { "id": "L1S2" }
                ]
            }
        ]
    }"#;

    #[test]
    fn loads_tutorial_and_ignores_unknown_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tutorial.json");
        fs::write(&path, TUTORIAL).expect("write");

        let tutorial = load_tutorial(&path).expect("load");
        let runner = &tutorial.config.test_runner;
        assert_eq!(runner.command, "npm run programmatic-test");
        assert_eq!(runner.directory.as_deref(), Some("coderoad"));
        let step = tutorial
            .find_step(&Position::new("L1", "L1S1"))
            .expect("step");
        assert_eq!(step.filter(), Some("L1S1Q"));
        let bare = tutorial
            .find_step(&Position::new("L1", "L1S2"))
            .expect("step");
        assert_eq!(bare.filter(), None);
    }

    #[test]
    fn missing_command_fails_schema() {
        let err = parse_tutorial(r#"{ "config": { "testRunner": {} }, "levels": [] }"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = parse_tutorial("{ not json").unwrap_err();
        assert!(format!("{err:#}").contains("parse tutorial json"));
    }
}
