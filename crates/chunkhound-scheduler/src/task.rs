//! Task definitions: the commands the worker executes

use crate::error::SchedulerResult;
use chunkhound_indexing::{FileOp, IndexOptions, IndexSummary};
use chunkhound_storage::{EmbeddingTableInfo, RegexSearchRequest, SearchPage};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::oneshot;

/// Priority classes, highest first
///
/// Within a class, FIFO. A LOW task already in flight is not preempted by
/// a later HIGH submission; the HIGH task runs on the next dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Interactive searches and health checks
    High,
    /// Ad-hoc stats and utility
    Medium,
    /// File-change-driven and periodic indexing
    Low,
}

/// A semantic search before query embedding
#[derive(Debug, Clone)]
pub struct SemanticQuery {
    pub query: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub path_filter: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub threshold: Option<f32>,
    pub max_response_bytes: Option<usize>,
}

/// Aggregate statistics for the `get_stats` tool
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub files: u64,
    pub chunks: u64,
    pub embeddings_by_model: Vec<EmbeddingTableInfo>,
    pub queue_depth: usize,
    pub background_scan_state: &'static str,
}

/// Health report for the `health_check` tool
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub db_connected: bool,
    pub worker_running: bool,
    pub last_checkpoint_age_secs: f64,
}

/// Commands executed by the single worker
///
/// Every database-touching operation in the system is one of these.
pub enum Task {
    SearchRegex {
        request: RegexSearchRequest,
        reply: oneshot::Sender<SchedulerResult<SearchPage>>,
    },
    SearchSemantic {
        request: SemanticQuery,
        reply: oneshot::Sender<SchedulerResult<SearchPage>>,
    },
    GetStats {
        reply: oneshot::Sender<SchedulerResult<EngineStats>>,
    },
    HealthCheck {
        reply: oneshot::Sender<HealthReport>,
    },
    ProcessFile {
        path: PathBuf,
        op: FileOp,
    },
    IndexDirectory {
        root: PathBuf,
        options: IndexOptions,
        reply: Option<oneshot::Sender<SchedulerResult<IndexSummary>>>,
    },
    Checkpoint,
}

impl Task {
    /// Short tag for logging
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SearchRegex { .. } => "search_regex",
            Self::SearchSemantic { .. } => "search_semantic",
            Self::GetStats { .. } => "get_stats",
            Self::HealthCheck { .. } => "health_check",
            Self::ProcessFile { .. } => "process_file",
            Self::IndexDirectory { .. } => "index_directory",
            Self::Checkpoint => "checkpoint",
        }
    }

    /// The default priority class for this task kind
    pub const fn default_priority(&self) -> Priority {
        match self {
            Self::SearchRegex { .. } | Self::SearchSemantic { .. } | Self::HealthCheck { .. } => {
                Priority::High
            }
            Self::GetStats { .. } | Self::Checkpoint => Priority::Medium,
            Self::ProcessFile { .. } | Self::IndexDirectory { .. } => Priority::Low,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("kind", &self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn searches_default_to_high_priority() {
        let (reply, _rx) = oneshot::channel();
        let task = Task::SearchRegex {
            request: RegexSearchRequest {
                pattern: "x".to_string(),
                path_filter: None,
                limit: 10,
                offset: 0,
                max_response_bytes: None,
            },
            reply,
        };
        assert_eq!(task.default_priority(), Priority::High);
    }

    #[test]
    fn indexing_defaults_to_low_priority() {
        let task = Task::ProcessFile {
            path: PathBuf::from("x"),
            op: FileOp::Modified,
        };
        assert_eq!(task.default_priority(), Priority::Low);
    }

    #[test]
    fn priority_orders_high_first() {
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
    }
}
