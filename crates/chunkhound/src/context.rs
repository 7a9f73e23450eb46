//! Engine context: one object that owns the wired-up system
//!
//! There are no process-wide singletons; the CLI commands and the tool
//! server each build an `EngineContext` at their entry point, thread it
//! down, and release it on scope exit with a guaranteed
//! drain → checkpoint → close.

use chunkhound_config::ApplicationConfig;
use chunkhound_embeddings::{EmbeddingBatcher, OpenAiProvider};
use chunkhound_indexing::IndexingCoordinator;
use chunkhound_scheduler::{
    spawn_handoff_monitor, CoordinationFile, SchedulerHandle, TaskQueue, Worker,
};
use chunkhound_storage::{ChunkStore, CheckpointPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long a challenger waits for an incumbent to hand the database over
const HANDOFF_WATCHDOG: Duration = Duration::from_secs(30);

/// The running engine: store worker, queue handle, shutdown plumbing
pub struct EngineContext {
    handle: SchedulerHandle,
    shutdown: CancellationToken,
    worker_task: JoinHandle<chunkhound_scheduler::SchedulerResult<()>>,
    monitor_task: JoinHandle<()>,
    coordination: CoordinationFile,
    config: ApplicationConfig,
    embeddings_enabled: bool,
}

impl EngineContext {
    /// Wire up the whole engine from configuration
    ///
    /// Opens the store (negotiating a cross-process handoff if another
    /// ChunkHound owns it), builds the embedding stack when credentials
    /// allow, and spawns the single worker.
    ///
    /// # Errors
    /// Fatal store-open failures; configuration problems surfaced by the
    /// provider constructor are downgraded to embeddings-disabled.
    pub async fn initialize(
        config: ApplicationConfig,
        no_embeddings: bool,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let db_path = config.database.path.clone();
        let policy = CheckpointPolicy {
            ops_threshold: config.database.checkpoint_ops_threshold,
            interval: config.database.checkpoint_interval(),
        };

        let store = open_with_handoff(&db_path, policy).await?;
        info!(db = %db_path.display(), ann = store.ann_ready(), "Store opened");

        let batcher = if no_embeddings {
            None
        } else {
            match OpenAiProvider::new(&config.embedding) {
                Ok(provider) => Some(Arc::new(EmbeddingBatcher::new(
                    Arc::new(provider),
                    &config.embedding,
                ))),
                Err(e) => {
                    warn!(error = %e, "Embeddings disabled");
                    None
                }
            }
        };
        let embeddings_enabled = batcher.is_some();

        let coordinator = IndexingCoordinator::new(batcher.clone(), &config);
        let queue = Arc::new(TaskQueue::new());

        let worker = Worker::new(store, coordinator, batcher, Arc::clone(&queue), shutdown.clone());
        let worker_task = tokio::spawn(worker.run());

        // Watch for a later starter requesting the database
        let coordination = CoordinationFile::for_db(&db_path);
        let monitor_task = spawn_handoff_monitor(coordination.clone(), shutdown.clone());

        Ok(Self {
            handle: SchedulerHandle::new(queue),
            shutdown,
            worker_task,
            monitor_task,
            coordination,
            config,
            embeddings_enabled,
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub const fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub const fn embeddings_enabled(&self) -> bool {
        self.embeddings_enabled
    }

    /// Orderly teardown: drain, checkpoint, close, acknowledge handoff
    ///
    /// # Errors
    /// Worker failures on the final checkpoint path.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        let _ = self.monitor_task.await;
        match self.worker_task.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "Worker task panicked during shutdown"),
        }
        // Clearing the sentinel tells a waiting challenger the database is
        // free
        self.coordination.clear();
        info!("Engine context released");
        Ok(())
    }
}

/// Open the store, requesting a coordinated handoff when another process
/// holds the database
async fn open_with_handoff(
    db_path: &std::path::Path,
    policy: CheckpointPolicy,
) -> anyhow::Result<ChunkStore> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    match ChunkStore::open(db_path, policy) {
        Ok(store) => Ok(store),
        Err(e) if is_lock_contention(&e) => {
            info!("Database is held by another process, requesting handoff");
            let coordination = CoordinationFile::for_db(db_path);
            coordination.request_handoff()?;
            coordination.wait_for_release(HANDOFF_WATCHDOG).await;
            Ok(ChunkStore::open(db_path, policy)?)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_lock_contention(error: &chunkhound_storage::StorageError) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("lock") || message.contains("held by another process")
}
