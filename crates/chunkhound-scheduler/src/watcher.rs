//! Debounced recursive file watcher
//!
//! Changes fire a single LOW-priority `process_file` task after a quiet
//! window. The debouncer coalesces per path, so a rapid save storm on one
//! file becomes one task.

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::TaskQueue;
use crate::task::Task;
use chunkhound_indexing::FileOp;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Holds the watcher alive; dropping it stops event delivery
pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl FileWatcher {
    /// Watch `root` recursively, emitting tasks into `queue`
    ///
    /// # Errors
    /// `SchedulerError::Watcher` when the OS watch cannot be established.
    pub fn start(
        root: &Path,
        debounce: Duration,
        queue: Arc<TaskQueue>,
    ) -> SchedulerResult<Self> {
        let task_queue = Arc::clone(&queue);
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        if event.kind != DebouncedEventKind::Any {
                            continue;
                        }
                        let path = event.path;
                        // Directories are re-discovered by the periodic
                        // scan; only file events become tasks
                        if path.is_dir() {
                            continue;
                        }
                        let op = if path.exists() {
                            FileOp::Modified
                        } else {
                            FileOp::Removed
                        };
                        debug!(path = %path.display(), ?op, "Watched change debounced");
                        task_queue.submit(Task::ProcessFile { path, op });
                    }
                }
                Err(e) => warn!(error = %e, "Watcher delivered an error"),
            }
        })
        .map_err(|e| SchedulerError::Watcher(e.to_string()))?;

        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SchedulerError::Watcher(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_event_becomes_a_low_task() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(TaskQueue::new());
        let _watcher = FileWatcher::start(
            dir.path(),
            Duration::from_millis(50),
            Arc::clone(&queue),
        )
        .unwrap();

        fs::write(dir.path().join("new.py"), "def fresh(): pass\n").unwrap();

        // Wait out the quiet window plus scheduling slack
        let mut waited = 0;
        while queue.depth() == 0 && waited < 40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += 1;
        }
        assert!(queue.depth() >= 1, "expected a debounced task");

        let scheduled = queue.try_recv().unwrap();
        match scheduled.task {
            Task::ProcessFile { path, op } => {
                assert!(path.ends_with("new.py"));
                assert_eq!(op, FileOp::Modified);
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deletion_maps_to_removed_op() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("doomed.py");
        fs::write(&target, "def doomed(): pass\n").unwrap();

        let queue = Arc::new(TaskQueue::new());
        let _watcher = FileWatcher::start(
            dir.path(),
            Duration::from_millis(50),
            Arc::clone(&queue),
        )
        .unwrap();

        fs::remove_file(&target).unwrap();

        let mut waited = 0;
        while queue.depth() == 0 && waited < 40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += 1;
        }
        assert!(queue.depth() >= 1);

        let scheduled = queue.try_recv().unwrap();
        match scheduled.task {
            Task::ProcessFile { path, op } => {
                assert!(path.ends_with("doomed.py"));
                assert_eq!(op, FileOp::Removed);
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }
}
