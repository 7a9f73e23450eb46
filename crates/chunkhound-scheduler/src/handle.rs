//! Cloneable handle for submitting tasks and awaiting replies

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::TaskQueue;
use crate::task::{EngineStats, HealthReport, Priority, SemanticQuery, Task};
use chunkhound_indexing::{IndexOptions, IndexSummary};
use chunkhound_storage::{RegexSearchRequest, SearchPage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

/// Client-side handle onto the scheduler
///
/// Tool handlers and the CLI talk to the worker exclusively through this;
/// each call enqueues a task and awaits its oneshot reply.
#[derive(Clone)]
pub struct SchedulerHandle {
    queue: Arc<TaskQueue>,
}

impl SchedulerHandle {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Regex search at HIGH priority
    ///
    /// # Errors
    /// `WorkerGone` when the worker has shut down; storage errors otherwise.
    pub async fn search_regex(&self, request: RegexSearchRequest) -> SchedulerResult<SearchPage> {
        let (reply, rx) = oneshot::channel();
        self.queue.submit(Task::SearchRegex { request, reply });
        rx.await.map_err(|_| SchedulerError::WorkerGone)?
    }

    /// Semantic search at HIGH priority
    ///
    /// # Errors
    /// `WorkerGone` when the worker has shut down; embedding and storage
    /// errors otherwise.
    pub async fn search_semantic(&self, request: SemanticQuery) -> SchedulerResult<SearchPage> {
        let (reply, rx) = oneshot::channel();
        self.queue.submit(Task::SearchSemantic { request, reply });
        rx.await.map_err(|_| SchedulerError::WorkerGone)?
    }

    /// Engine statistics at MEDIUM priority
    pub async fn get_stats(&self) -> SchedulerResult<EngineStats> {
        let (reply, rx) = oneshot::channel();
        self.queue.submit(Task::GetStats { reply });
        rx.await.map_err(|_| SchedulerError::WorkerGone)?
    }

    /// Health check at HIGH priority
    pub async fn health_check(&self) -> SchedulerResult<HealthReport> {
        let (reply, rx) = oneshot::channel();
        self.queue.submit(Task::HealthCheck { reply });
        rx.await.map_err(|_| SchedulerError::WorkerGone)
    }

    /// Foreground indexing run; LOW priority but awaited
    pub async fn index_directory(
        &self,
        root: PathBuf,
        options: IndexOptions,
    ) -> SchedulerResult<IndexSummary> {
        let (reply, rx) = oneshot::channel();
        self.queue.submit(Task::IndexDirectory {
            root,
            options,
            reply: Some(reply),
        });
        rx.await.map_err(|_| SchedulerError::WorkerGone)?
    }

    /// Fire-and-forget background scan with a cancellation token
    pub fn submit_background_scan(
        &self,
        root: PathBuf,
        options: IndexOptions,
        reply: Option<oneshot::Sender<SchedulerResult<IndexSummary>>>,
    ) -> tokio_util::sync::CancellationToken {
        self.queue.submit_with(
            Task::IndexDirectory {
                root,
                options,
                reply,
            },
            Priority::Low,
            None,
        )
    }

    /// Request an explicit checkpoint
    pub fn request_checkpoint(&self) {
        self.queue.submit(Task::Checkpoint);
    }

    /// Enqueue with an explicit deadline (deadline-expired tasks are
    /// dropped at dequeue)
    pub fn submit_with_deadline(&self, task: Task, priority: Priority, deadline: Instant) {
        self.queue.submit_with(task, priority, Some(deadline));
    }
}
