//! Stable exit codes for `tap-runner` commands.

/// Command succeeded; for `run`, all tests passed (or the probe completed).
pub const OK: i32 = 0;
/// Invalid input: unreadable tutorial/config, unknown arguments, watcher failure.
pub const INVALID: i32 = 1;
/// `tap-runner run` parsed a failing assertion.
pub const FAIL: i32 = 2;
/// `tap-runner run` could not produce a clean test result (crash, build error).
pub const ERROR: i32 = 3;
