//! Cross-process coordination over a sentinel file
//!
//! When a second ChunkHound process wants the database (say a one-shot CLI
//! indexer while an MCP server owns it), the challenger writes a small
//! handoff file beside the database. The incumbent polls it with bounded
//! waits, drains, checkpoints, closes, and removes the file on exit; the
//! challenger waits for the removal with a watchdog timeout so a dead
//! incumbent can never deadlock it.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const HANDOFF_SUFFIX: &str = ".handoff";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The on-disk handoff sentinel for one database
#[derive(Debug, Clone)]
pub struct CoordinationFile {
    path: PathBuf,
}

impl CoordinationFile {
    /// Sentinel path for a database file
    pub fn for_db(db_path: &Path) -> Self {
        let mut name = db_path.file_name().map_or_else(
            || std::ffi::OsString::from("db"),
            std::ffi::OsStr::to_os_string,
        );
        name.push(HANDOFF_SUFFIX);
        Self {
            path: db_path.with_file_name(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Challenger side: ask the incumbent to shut down
    ///
    /// # Errors
    /// Filesystem errors writing the sentinel.
    pub fn request_handoff(&self) -> std::io::Result<()> {
        let body = format!("pid={}\n", std::process::id());
        std::fs::write(&self.path, body)
    }

    /// Incumbent side: has someone requested the database?
    pub fn is_requested(&self) -> bool {
        self.path.exists()
    }

    /// Remove the sentinel (incumbent acknowledges by exiting and clearing)
    pub fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to clear handoff file");
        }
    }

    /// Challenger side: wait until the incumbent clears the sentinel
    ///
    /// Returns true when the handoff completed, false when the watchdog
    /// timed out (the challenger proceeds anyway; a hung incumbent must
    /// not deadlock the system).
    pub async fn wait_for_release(&self, watchdog: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + watchdog;
        while self.path.exists() {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    path = %self.path.display(),
                    "Handoff watchdog expired, proceeding without acknowledgement"
                );
                self.clear();
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        true
    }
}

/// Incumbent side: poll the sentinel and trigger shutdown when seen
///
/// Uses bounded waits so the loop also observes `shutdown` promptly.
pub fn spawn_handoff_monitor(
    coordination: CoordinationFile,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            if coordination.is_requested() {
                info!("Coordinated shutdown requested by another process");
                shutdown.cancel();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sentinel_lives_beside_the_database() {
        let coordination = CoordinationFile::for_db(Path::new("/data/.chunkhound.db"));
        assert_eq!(
            coordination.path(),
            Path::new("/data/.chunkhound.db.handoff")
        );
    }

    #[test]
    fn request_and_clear_round_trip() {
        let dir = TempDir::new().unwrap();
        let coordination = CoordinationFile::for_db(&dir.path().join("x.db"));

        assert!(!coordination.is_requested());
        coordination.request_handoff().unwrap();
        assert!(coordination.is_requested());
        coordination.clear();
        assert!(!coordination.is_requested());
        // Clearing twice is harmless
        coordination.clear();
    }

    #[tokio::test]
    async fn wait_returns_true_once_cleared() {
        let dir = TempDir::new().unwrap();
        let coordination = CoordinationFile::for_db(&dir.path().join("x.db"));
        coordination.request_handoff().unwrap();

        let waiter = coordination.clone();
        let handle =
            tokio::spawn(async move { waiter.wait_for_release(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        coordination.clear();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn watchdog_prevents_deadlock() {
        let dir = TempDir::new().unwrap();
        let coordination = CoordinationFile::for_db(&dir.path().join("x.db"));
        coordination.request_handoff().unwrap();

        // Nobody ever clears it; the watchdog fires and cleans up
        let released = coordination.wait_for_release(Duration::from_millis(300)).await;
        assert!(!released);
        assert!(!coordination.is_requested());
    }

    #[tokio::test]
    async fn monitor_triggers_shutdown_on_request() {
        let dir = TempDir::new().unwrap();
        let coordination = CoordinationFile::for_db(&dir.path().join("x.db"));
        let shutdown = CancellationToken::new();

        let monitor = spawn_handoff_monitor(coordination.clone(), shutdown.clone());
        coordination.request_handoff().unwrap();

        tokio::time::timeout(Duration::from_secs(2), shutdown.cancelled())
            .await
            .expect("shutdown should trigger");
        monitor.await.unwrap();
    }
}
