//! The single cooperative worker
//!
//! Owns the store's only writer connection and executes every DB-touching
//! task one at a time. Tasks cooperate by suspending at awaited I/O (file
//! reads, vectorizer requests, transactions, checkpoints); the worker never
//! preempts. Shutdown is observed between tasks: drain, checkpoint, close.
//! Signal handlers only cancel the shutdown token; they never touch the
//! store.

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::{ScheduledTask, TaskQueue};
use crate::task::{EngineStats, HealthReport, SemanticQuery, Task};
use chunkhound_embeddings::EmbeddingBatcher;
use chunkhound_indexing::IndexingCoordinator;
use chunkhound_storage::{ChunkStore, SemanticSearchRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared flags the stats/health tasks report on
#[derive(Default)]
pub struct WorkerState {
    scan_running: AtomicBool,
    running: AtomicBool,
}

impl WorkerState {
    pub fn scan_state(&self) -> &'static str {
        if self.scan_running.load(Ordering::Relaxed) {
            "running"
        } else {
            "idle"
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Executes tasks from the queue against the store
pub struct Worker {
    store: ChunkStore,
    coordinator: IndexingCoordinator,
    batcher: Option<Arc<EmbeddingBatcher>>,
    queue: Arc<TaskQueue>,
    shutdown: CancellationToken,
    state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(
        store: ChunkStore,
        coordinator: IndexingCoordinator,
        batcher: Option<Arc<EmbeddingBatcher>>,
        queue: Arc<TaskQueue>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            coordinator,
            batcher,
            queue,
            shutdown,
            state: Arc::new(WorkerState::default()),
        }
    }

    pub fn state(&self) -> Arc<WorkerState> {
        Arc::clone(&self.state)
    }

    /// Run until shutdown, then drain → checkpoint → close
    ///
    /// # Errors
    /// Storage failures on the final checkpoint/close path.
    pub async fn run(mut self) -> SchedulerResult<()> {
        self.state.running.store(true, Ordering::Relaxed);
        info!("Worker started");

        loop {
            tokio::select! {
                // Bounded wait on the queue keeps the loop responsive to
                // cancellation; no unconditional sleeps
                () = self.shutdown.cancelled() => break,
                scheduled = self.queue.recv() => {
                    self.execute(scheduled).await;
                }
            }
        }

        // Shutdown: no new submissions, drop queued tasks (their reply
        // senders close and callers observe WorkerGone), then make
        // everything already committed durable
        self.queue.close();
        let mut dropped = 0usize;
        while self.queue.try_recv().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Dropped queued tasks at shutdown");
        }

        self.state.running.store(false, Ordering::Relaxed);
        self.store.checkpoint()?;
        self.store.close()?;
        info!("Worker stopped");
        Ok(())
    }

    async fn execute(&mut self, scheduled: ScheduledTask) {
        let now = Instant::now();
        if scheduled.expired(now) {
            // Expired or cancelled while queued: dropping the task drops
            // its reply sender, which the caller observes
            debug!(kind = scheduled.task.kind(), "Dropping expired task");
            return;
        }

        let kind = scheduled.task.kind();
        debug!(kind, task_id = %scheduled.id, "Executing task");
        match scheduled.task {
            Task::SearchRegex { request, reply } => {
                let result = self
                    .store
                    .search_regex(&request)
                    .map_err(SchedulerError::from);
                let _ = reply.send(result);
            }
            Task::SearchSemantic { request, reply } => {
                let result = self.run_semantic_search(request).await;
                let _ = reply.send(result);
            }
            Task::GetStats { reply } => {
                let result = self.collect_stats();
                let _ = reply.send(result);
            }
            Task::HealthCheck { reply } => {
                let _ = reply.send(self.health_report());
            }
            Task::ProcessFile { path, op } => {
                match self.coordinator.process_file(&mut self.store, &path, op).await {
                    Ok(outcome) => {
                        debug!(path = %path.display(), ?outcome, "Watched file processed");
                    }
                    Err(e) => {
                        // Background tasks never surface transient failures
                        // to search callers; log and move on
                        warn!(path = %path.display(), error = %e, "File task failed");
                    }
                }
            }
            Task::IndexDirectory {
                root,
                options,
                reply,
            } => {
                self.state.scan_running.store(true, Ordering::Relaxed);
                let result = self
                    .run_directory_scan(&root, &options, &scheduled.cancel)
                    .await;
                self.state.scan_running.store(false, Ordering::Relaxed);

                match (&result, reply) {
                    (_, Some(reply)) => {
                        let _ = reply.send(result);
                    }
                    (Err(e), None) => {
                        warn!(root = %root.display(), error = %e, "Background scan failed");
                    }
                    (Ok(_), None) => {}
                }
            }
            Task::Checkpoint => {
                if let Err(e) = self.store.checkpoint() {
                    warn!(error = %e, "Explicit checkpoint failed");
                }
            }
        }
    }

    /// Run a directory scan as per-file steps, draining interactive tasks
    /// between steps
    ///
    /// The worker runs one task at a time, but a whole-tree scan executed
    /// as one opaque unit would hold searches hostage for its entire
    /// duration. Stepping through the plan and servicing HIGH work between
    /// files bounds search latency to one in-flight file, not one tree.
    async fn run_directory_scan(
        &mut self,
        root: &std::path::Path,
        options: &chunkhound_indexing::IndexOptions,
        cancel: &CancellationToken,
    ) -> SchedulerResult<chunkhound_indexing::IndexSummary> {
        use chunkhound_indexing::IndexingError;

        let mut summary = chunkhound_indexing::IndexSummary::default();
        let plan = self.coordinator.plan(&self.store, root, options)?;

        for path in &plan.deletions {
            if cancel.is_cancelled() || self.shutdown.is_cancelled() {
                return Err(IndexingError::Cancelled.into());
            }
            self.coordinator
                .delete_path(&mut self.store, path, &mut summary)?;
            self.drain_interactive().await;
        }

        for candidate in &plan.candidates {
            if cancel.is_cancelled() || self.shutdown.is_cancelled() {
                return Err(IndexingError::Cancelled.into());
            }
            let outcome = self
                .coordinator
                .index_candidate(&mut self.store, candidate, options.force_reindex, &mut summary)
                .await;
            summary.record(&candidate.path, &outcome);
            self.drain_interactive().await;
        }
        self.store.checkpoint()?;

        if !options.no_embeddings
            && let Some(table) = self.coordinator.embedding_table(&mut self.store)?
        {
            let bulk = summary.chunks_written > 1000;
            if bulk {
                self.store.begin_bulk_load(&table)?;
            }
            let mut failed = std::collections::HashSet::new();
            loop {
                if cancel.is_cancelled() || self.shutdown.is_cancelled() {
                    return Err(IndexingError::Cancelled.into());
                }
                let attempted = self
                    .coordinator
                    .embed_missing_batch(&mut self.store, &table, &mut failed, &mut summary)
                    .await?;
                if attempted == 0 {
                    break;
                }
                self.drain_interactive().await;
            }
            if bulk {
                self.store.finish_bulk_load(&table)?;
            }
        }

        self.store.checkpoint()?;
        Ok(summary)
    }

    /// Service queued HIGH-priority tasks before resuming background work
    async fn drain_interactive(&mut self) {
        while let Some(scheduled) = self.queue.try_recv_high() {
            if scheduled.expired(Instant::now()) {
                continue;
            }
            match scheduled.task {
                Task::SearchRegex { request, reply } => {
                    let result = self
                        .store
                        .search_regex(&request)
                        .map_err(SchedulerError::from);
                    let _ = reply.send(result);
                }
                Task::SearchSemantic { request, reply } => {
                    let result = self.run_semantic_search(request).await;
                    let _ = reply.send(result);
                }
                Task::HealthCheck { reply } => {
                    let _ = reply.send(self.health_report());
                }
                // Only interactive kinds are queued at HIGH priority
                other => {
                    warn!(kind = other.kind(), "Unexpected task at HIGH priority");
                }
            }
        }
    }

    /// Embed the query with the corpus model and run the ANN lookup
    async fn run_semantic_search(
        &mut self,
        request: SemanticQuery,
    ) -> SchedulerResult<chunkhound_storage::SearchPage> {
        let batcher = self
            .batcher
            .as_ref()
            .ok_or_else(|| SchedulerError::Embedding("embeddings are disabled".to_string()))?;

        let provider = batcher.provider();
        let provider_name = request
            .provider
            .clone()
            .unwrap_or_else(|| provider.provider_name().to_string());
        let model_name = request
            .model
            .clone()
            .unwrap_or_else(|| provider.model_name().to_string());

        // The corpus table for this (provider, model) pair must exist
        let table = self
            .store
            .embedding_tables()?
            .into_iter()
            .find(|t| t.provider == provider_name && t.model == model_name)
            .ok_or_else(|| {
                SchedulerError::Embedding(format!(
                    "no embeddings indexed for {provider_name}/{model_name}"
                ))
            })?;

        let outcome = batcher.embed(&[request.query.clone()]).await;
        let query_vector = outcome
            .vectors
            .get(&0)
            .map(|v| v.as_ref().clone())
            .ok_or_else(|| {
                let detail = outcome
                    .failures
                    .first()
                    .map_or_else(|| "empty query".to_string(), |f| f.error.to_string());
                SchedulerError::Embedding(format!("query embedding failed: {detail}"))
            })?;

        self.store
            .search_semantic(&SemanticSearchRequest {
                table: table.table_name,
                dimension: table.dimension,
                query_vector,
                path_filter: request.path_filter,
                limit: request.limit,
                offset: request.offset,
                threshold: request.threshold,
                max_response_bytes: request.max_response_bytes,
            })
            .map_err(SchedulerError::from)
    }

    fn collect_stats(&self) -> SchedulerResult<EngineStats> {
        let stats = self.store.stats()?;
        Ok(EngineStats {
            files: stats.files,
            chunks: stats.chunks,
            embeddings_by_model: stats.embeddings_by_model,
            queue_depth: self.queue.depth(),
            background_scan_state: self.state.scan_state(),
        })
    }

    fn health_report(&self) -> HealthReport {
        let db_connected = self.store.stats().is_ok();
        HealthReport {
            status: if db_connected { "ok" } else { "degraded" },
            db_connected,
            worker_running: true,
            last_checkpoint_age_secs: self.store.last_checkpoint_age().as_secs_f64(),
        }
    }
}
