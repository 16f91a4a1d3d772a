//! TAP output parsing.
//!
//! Only the subset test tools actually emit is recognized: test lines, the
//! plan, `Bail out!`, diagnostics and indented failure blocks. Anything else
//! is collected as a log line so `console.log` output from tests reaches the
//! learner. Nothing here fails; unexpected input degrades to `ok = false`.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{ParsedResult, TestFailure, TestSummary};

static TEST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(not )?ok\b(?:\s+(\d+))?\s*(?:-\s*)?(.*)$").expect("valid test line regex")
});
static PLAN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1\.\.(\d+)\b").expect("valid plan regex"));
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)#\s*(skip|todo)\b.*$").expect("valid directive regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Skip,
    Todo,
}

#[derive(Debug)]
struct TestLine {
    passed: bool,
    number: Option<u32>,
    name: String,
    directive: Option<Directive>,
}

#[derive(Debug, Default)]
struct FailureBlock {
    name: String,
    message: Option<String>,
    details: Vec<String>,
}

impl FailureBlock {
    fn push_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "---" || trimmed == "..." {
            return;
        }
        if self.message.is_none()
            && let Some(value) = trimmed.strip_prefix("message:")
        {
            let value = unquote(value.trim());
            if !value.is_empty() {
                self.message = Some(value.to_string());
                return;
            }
        }
        self.details.push(trimmed.to_string());
    }

    fn finish(self) -> TestFailure {
        TestFailure {
            message: self.message.unwrap_or(self.name),
            details: (!self.details.is_empty()).then(|| self.details.join("\n")),
        }
    }
}

/// Which test the current indented block belongs to.
enum Block {
    None,
    Passed,
    Failed(FailureBlock),
}

/// Parse TAP text into a [`ParsedResult`].
///
/// `ok` is true only when at least one test ran (or the plan is `1..0`), no
/// test failed, the plan matches the number of tests and the tool did not
/// bail out.
pub fn parse(text: &str) -> ParsedResult {
    let mut summary = TestSummary::new();
    let mut failed = Vec::new();
    let mut logs = Vec::new();
    let mut plan: Option<u32> = None;
    let mut tests: u32 = 0;
    let mut anomaly = false;
    let mut block = Block::None;

    for line in text.lines() {
        let indented = line.starts_with(|c: char| c.is_whitespace());
        if indented {
            match &mut block {
                Block::Failed(failure) => {
                    failure.push_line(line);
                    continue;
                }
                Block::Passed => continue,
                Block::None => {}
            }
        } else if let Block::Failed(failure) = std::mem::replace(&mut block, Block::None) {
            failed.push(failure.finish());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("TAP version") {
            continue;
        }
        if let Some(test) = parse_test_line(trimmed) {
            tests += 1;
            let name = if test.name.is_empty() {
                format!("test {}", test.number.unwrap_or(tests))
            } else {
                test.name
            };
            let counts_as_pass = test.passed || test.directive.is_some();
            summary
                .entry(name.clone())
                .and_modify(|passed| *passed &= counts_as_pass)
                .or_insert(counts_as_pass);
            block = if counts_as_pass {
                Block::Passed
            } else {
                Block::Failed(FailureBlock {
                    name,
                    ..FailureBlock::default()
                })
            };
            continue;
        }
        if let Some(caps) = PLAN_LINE.captures(trimmed) {
            plan = caps[1].parse().ok();
            continue;
        }
        if trimmed.starts_with("Bail out!") {
            anomaly = true;
            logs.push(trimmed.to_string());
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        logs.push(line.trim_end().to_string());
    }

    if let Block::Failed(failure) = block {
        failed.push(failure.finish());
    }

    if let Some(planned) = plan
        && planned != tests
    {
        anomaly = true;
    }
    let ran = tests > 0 || plan == Some(0);
    let ok = ran && !anomaly && failed.is_empty();

    ParsedResult {
        ok,
        failed,
        summary,
        logs,
    }
}

fn parse_test_line(line: &str) -> Option<TestLine> {
    let caps = TEST_LINE.captures(line)?;
    let passed = caps.get(1).is_none();
    let number = caps.get(2).and_then(|m| m.as_str().parse().ok());
    let description = caps.get(3).map_or("", |m| m.as_str());

    let (name, directive) = match DIRECTIVE.captures(description) {
        Some(directive_caps) => {
            let kind = if directive_caps[1].eq_ignore_ascii_case("skip") {
                Directive::Skip
            } else {
                Directive::Todo
            };
            let start = directive_caps.get(0).map_or(description.len(), |m| m.start());
            (&description[..start], Some(kind))
        }
        None => (description, None),
    };

    Some(TestLine {
        passed,
        number,
        name: name.trim().to_string(),
        directive,
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
