//! File-save trigger: run the tests whenever workspace files change.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::types::Position;
use crate::io::executor::ProcessExecutor;
use crate::orchestrate::{Callbacks, RunRequest, TestRunner};

/// Directories whose changes never trigger a run.
const IGNORED_DIRS: &[&str] = &[".git", ".tap-runner", "node_modules", "target"];

/// Whether a filesystem event under `root` should trigger a test run.
pub fn is_relevant_change(root: &Path, event: &NotifyEvent) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| !is_ignored_path(root, path))
}

fn is_ignored_path(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name)),
        _ => false,
    })
}

/// Watch `root` and trigger a visible run for `position` on every relevant
/// change. Runs forever (until the watcher channel closes).
///
/// Each trigger is spawned as its own task: a burst of saves reaches the
/// runner's rate gate, which drops all but the first start in each window,
/// and any result superseded by a later run is discarded.
pub async fn watch_and_run<E, C>(
    runner: Arc<TestRunner<E, C>>,
    root: PathBuf,
    position: Position,
    poll_interval: Duration,
) -> Result<()>
where
    E: ProcessExecutor + 'static,
    C: Callbacks + 'static,
{
    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.try_send(event);
            }
            Err(err) => warn!(err = %err, "watch error"),
        },
        notify::Config::default().with_poll_interval(poll_interval),
    )
    .context("create file watcher")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watch {}", root.display()))?;
    info!(path = %root.display(), "watching for changes");

    while let Some(event) = rx.recv().await {
        if !is_relevant_change(&root, &event) {
            continue;
        }
        debug!(paths = ?event.paths, "change detected, triggering run");
        let runner = runner.clone();
        let position = position.clone();
        tokio::spawn(async move {
            let disposition = runner.run(RunRequest::visible(position)).await;
            debug!(?disposition, "watch-triggered run done");
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> NotifyEvent {
        NotifyEvent {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn source_edit_is_relevant() {
        let root = Path::new("/work");
        assert!(is_relevant_change(
            root,
            &event(EventKind::Modify(ModifyKind::Any), "/work/src/index.js")
        ));
        assert!(is_relevant_change(
            root,
            &event(EventKind::Create(CreateKind::File), "/work/src/new.js")
        ));
    }

    #[test]
    fn ignored_directories_do_not_trigger() {
        let root = Path::new("/work");
        for path in [
            "/work/.git/index",
            "/work/node_modules/mocha/index.js",
            "/work/.tap-runner/config.toml",
        ] {
            assert!(
                !is_relevant_change(root, &event(EventKind::Modify(ModifyKind::Any), path)),
                "{path} should be ignored"
            );
        }
    }

    #[test]
    fn ignored_name_above_root_does_not_matter() {
        let root = Path::new("/home/me/target/work");
        assert!(is_relevant_change(
            root,
            &event(
                EventKind::Modify(ModifyKind::Any),
                "/home/me/target/work/src/a.js"
            )
        ));
    }

    #[tokio::test]
    async fn saving_a_file_triggers_one_run() {
        use crate::core::types::OutcomeKind;
        use crate::test_support::{
            ManualClock, RecordingCallbacks, RecordingSink, ScriptedExecutor, ScriptedRun,
            tutorial_with_steps,
        };

        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(temp.path().join("src")).expect("mkdir");
        let runner = Arc::new(
            TestRunner::new(
                tutorial_with_steps(&[("L1S1", None)]),
                temp.path(),
                ScriptedExecutor::new(vec![ScriptedRun::output("ok 1 - adds\n", "")]),
                RecordingCallbacks::default(),
            )
            .with_sink(Arc::new(RecordingSink::default()))
            .with_clock(Arc::new(ManualClock::new())),
        );

        let watcher = tokio::spawn(watch_and_run(
            runner.clone(),
            temp.path().to_path_buf(),
            Position::new("L1", "L1S1"),
            Duration::from_millis(50),
        ));
        // Let the watcher take its baseline scan before the save.
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(temp.path().join("src/index.js"), "module.exports = 1;\n")
            .expect("save");

        tokio::time::timeout(Duration::from_secs(5), runner.executor().wait_for_calls(1))
            .await
            .expect("run triggered by save");
        tokio::time::sleep(Duration::from_millis(300)).await;
        watcher.abort();

        assert_eq!(runner.executor().calls().len(), 1);
        assert_eq!(runner.executor().calls()[0].workdir, temp.path());
        let kinds: Vec<_> = runner
            .callbacks()
            .outcomes()
            .iter()
            .map(|outcome| outcome.kind())
            .collect();
        assert_eq!(kinds, vec![OutcomeKind::Running, OutcomeKind::Success]);
    }

    #[test]
    fn removals_do_not_trigger() {
        let root = Path::new("/work");
        assert!(!is_relevant_change(
            root,
            &event(EventKind::Remove(RemoveKind::File), "/work/src/a.js")
        ));
    }
}
