//! Per-file outcomes and the run summary

use serde::Serialize;
use std::path::PathBuf;

/// Why a file was skipped rather than indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Bytes are not valid UTF-8
    Encoding,
    /// No extractor registered for the detected language
    Unsupported,
}

/// Status of one file after a pipeline pass
///
/// `Unchanged` is a successful outcome, not an error: an up-to-date file
/// produces zero work by design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Added,
    Updated,
    Unchanged,
    Deleted,
    Skipped(SkipReason),
    Failed(String),
}

/// Aggregate result of `process_directory`
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Chunks written during this run
    pub chunks_written: usize,
    /// Embedding vectors generated during this run (cache hits excluded)
    pub embeddings_generated: usize,
    /// Per-chunk embedding failures (oversize inputs and the like)
    pub embedding_failures: usize,
    /// Files that failed, with their diagnostics
    pub failures: Vec<(PathBuf, String)>,
}

impl IndexSummary {
    /// Record one file outcome into the counters
    pub fn record(&mut self, path: &std::path::Path, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Added => self.added += 1,
            FileOutcome::Updated => self.updated += 1,
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Deleted => self.deleted += 1,
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures.push((path.to_path_buf(), reason.clone()));
            }
        }
    }

    /// Total files the run looked at
    pub const fn total(&self) -> usize {
        self.added + self.updated + self.unchanged + self.deleted + self.skipped + self.failed
    }
}
