//! Human-readable failure report for the failure output channel.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::ParsedResult;

const FAILURE_REPORT_TEMPLATE: &str = include_str!("templates/failure_report.txt");

static REPORT_ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("failure_report", FAILURE_REPORT_TEMPLATE)
        .expect("failure report template should be valid");
    env
});

#[derive(Debug, Serialize)]
struct FailureContext<'a> {
    message: &'a str,
    details: Vec<&'a str>,
}

/// Render every failed test with its details, followed by the captured logs.
pub fn format_fail_output(parsed: &ParsedResult) -> String {
    let failed: Vec<FailureContext<'_>> = parsed
        .failed
        .iter()
        .map(|fail| FailureContext {
            message: if fail.message.is_empty() {
                "Test Failed"
            } else {
                fail.message.as_str()
            },
            details: fail
                .details
                .as_deref()
                .map(|details| details.lines().collect())
                .unwrap_or_default(),
        })
        .collect();

    let rendered = REPORT_ENV
        .get_template("failure_report")
        .and_then(|template| template.render(context! { failed => failed, logs => parsed.logs }));
    match rendered {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(err = %err, "failure report template failed, using plain list");
            plain_report(&failed)
        }
    }
}

fn plain_report(failed: &[FailureContext<'_>]) -> String {
    let mut out = String::from("FAILED TESTS\n");
    for fail in failed {
        out.push_str(&format!("  ✘ {}\n", fail.message));
        for line in &fail.details {
            out.push_str(&format!("    {line}\n"));
        }
    }
    out
}
