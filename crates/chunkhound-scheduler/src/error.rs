//! Scheduler error types

use thiserror::Error;

/// Errors produced by the scheduler and its worker
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The worker dropped the reply channel (shutdown or crash)
    #[error("Worker is not running")]
    WorkerGone,

    /// The task was cancelled before or while running
    #[error("Task cancelled")]
    Cancelled,

    /// The task's deadline elapsed while it was queued
    #[error("Task deadline exceeded")]
    DeadlineExceeded,

    /// Storage engine failure surfaced through a task
    #[error(transparent)]
    Storage(#[from] chunkhound_storage::StorageError),

    /// Indexing failure surfaced through a task
    #[error(transparent)]
    Indexing(#[from] chunkhound_indexing::IndexingError),

    /// Embedding failure surfaced through a task
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// File watcher failure
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Generic error message
    #[error("Scheduler error: {0}")]
    Other(String),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
