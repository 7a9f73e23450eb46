//! Periodic background reconciliation
//!
//! A ticker enqueues LOW-priority directory scans. Anti-overlap: if the
//! previous scan is still incomplete when a tick fires, it is cancelled
//! and the tick skipped; scans never stack behind each other.

use crate::error::SchedulerResult;
use crate::handle::SchedulerHandle;
use chunkhound_indexing::{IndexOptions, IndexSummary};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type InFlight = (CancellationToken, oneshot::Receiver<SchedulerResult<IndexSummary>>);

/// Spawn the periodic scanner; cancel `shutdown` to stop it
pub fn spawn_periodic_scanner(
    handle: SchedulerHandle,
    root: PathBuf,
    options: IndexOptions,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick would race the initial foreground index
        ticker.tick().await;

        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Some((token, receiver)) = &mut in_flight {
                match receiver.try_recv() {
                    Ok(result) => {
                        log_scan_result(&result);
                        in_flight = None;
                    }
                    Err(oneshot::error::TryRecvError::Closed) => {
                        in_flight = None;
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {
                        // Ran longer than a full cycle: cancel the older
                        // scan, never stack a second one behind it
                        warn!("Previous background scan still running, cancelling it");
                        token.cancel();
                        in_flight = None;
                        continue;
                    }
                }
            }

            debug!(root = %root.display(), "Enqueueing periodic scan");
            let (reply, receiver) = oneshot::channel();
            let token =
                handle.submit_background_scan(root.clone(), options.clone(), Some(reply));
            in_flight = Some((token, receiver));
        }

        // Leaving a background scan running at shutdown is fine; the worker
        // observes the shutdown token independently
        info!("Periodic scanner stopped");
    })
}

fn log_scan_result(result: &SchedulerResult<IndexSummary>) {
    match result {
        Ok(summary) if summary.added + summary.updated + summary.deleted > 0 => {
            info!(
                added = summary.added,
                updated = summary.updated,
                deleted = summary.deleted,
                "Background scan applied changes"
            );
        }
        Ok(_) => debug!("Background scan found nothing to do"),
        Err(e) => warn!(error = %e, "Background scan failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskQueue;
    use crate::task::Task;
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_enqueue_scans_without_stacking() {
        let queue = Arc::new(TaskQueue::new());
        let handle = SchedulerHandle::new(Arc::clone(&queue));
        let shutdown = CancellationToken::new();

        let scanner = spawn_periodic_scanner(
            handle,
            PathBuf::from("/tmp/unused"),
            IndexOptions::default(),
            Duration::from_millis(30),
            shutdown.clone(),
        );

        // Let several ticks fire with nobody draining the queue
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        scanner.await.unwrap();

        // Anti-overlap: an unfinished scan is cancelled and not stacked, so
        // at most one live scan sits in the queue alongside cancelled ones
        let mut live = 0;
        while let Some(scheduled) = queue.try_recv() {
            assert!(matches!(scheduled.task, Task::IndexDirectory { .. }));
            if !scheduled.cancel.is_cancelled() {
                live += 1;
            }
        }
        assert!(live <= 1, "scans stacked: {live} live tasks");
    }

    #[tokio::test]
    async fn shutdown_stops_the_ticker() {
        let queue = Arc::new(TaskQueue::new());
        let handle = SchedulerHandle::new(Arc::clone(&queue));
        let shutdown = CancellationToken::new();

        let scanner = spawn_periodic_scanner(
            handle,
            PathBuf::from("/tmp/unused"),
            IndexOptions::default(),
            Duration::from_secs(3600),
            shutdown.clone(),
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), scanner)
            .await
            .expect("scanner should stop promptly")
            .unwrap();
    }
}
