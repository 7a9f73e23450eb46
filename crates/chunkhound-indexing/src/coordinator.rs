//! Phases 2 and 3: reconcile and update
//!
//! The coordinator guarantees database state == disk state when a run
//! completes: rows for files that vanished (or now match an exclude) are
//! deleted first, then additions and modified candidates are parsed and
//! their chunks replaced atomically, then embeddings are generated in a
//! separate phase against the already-consistent store.
//!
//! The work is exposed both as a whole (`process_directory`, used by the
//! one-shot CLI path) and as steps (`plan`, `index_candidate`,
//! `embed_missing_batch`) so the scheduler's worker can interleave
//! higher-priority tasks between files during background scans.

use crate::discovery::{content_crc32, discover, Candidate, DiscoveryOptions};
use crate::error::{IndexingError, IndexingResult};
use crate::outcome::{FileOutcome, IndexSummary, SkipReason};
use chunkhound_config::ApplicationConfig;
use chunkhound_embeddings::EmbeddingBatcher;
use chunkhound_parsing::{is_supported, ChunkExtractor, ParsingError};
use chunkhound_storage::{ChunkStore, NewFile};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Options for one indexing run
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Bypass the change test and re-parse everything
    pub force_reindex: bool,
    /// Stop after the chunk phase
    pub no_embeddings: bool,
    /// Also remove rows for paths outside the indexed root (orphans left
    /// behind by runs over other directories)
    pub cleanup: bool,
}

/// Watcher-reported operation on a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    /// Created or modified; the change test decides what work happens
    Modified,
    Removed,
}

/// The reconciliation result: the minimal work to make DB state equal
/// disk state
#[derive(Debug)]
pub struct DirectoryPlan {
    pub root: PathBuf,
    /// Stored paths with no matching candidate on disk
    pub deletions: Vec<String>,
    /// Files on disk, additions and update candidates alike
    pub candidates: Vec<Candidate>,
}

/// Orchestrates discover → reconcile → update for a directory root
pub struct IndexingCoordinator {
    extractor: ChunkExtractor,
    batcher: Option<Arc<EmbeddingBatcher>>,
    db_batch_size: usize,
    mtime_epsilon: f64,
}

impl IndexingCoordinator {
    pub fn new(batcher: Option<Arc<EmbeddingBatcher>>, config: &ApplicationConfig) -> Self {
        Self {
            extractor: ChunkExtractor::new(),
            batcher,
            db_batch_size: config.database.batch_size,
            mtime_epsilon: config.indexing.mtime_epsilon_secs,
        }
    }

    /// Phases 1 and 2: discover candidates and compute the deletion set
    ///
    /// # Errors
    /// IO errors on the walk, `InvalidGlob` for bad patterns, storage
    /// failures loading existing rows.
    pub fn plan(
        &self,
        store: &ChunkStore,
        root: &Path,
        options: &IndexOptions,
    ) -> IndexingResult<DirectoryPlan> {
        let root = root.canonicalize()?;

        let discovery = DiscoveryOptions {
            include: options.include.clone(),
            exclude: options.exclude.clone(),
        };
        let candidates = discover(&root, &discovery)?;

        let root_prefix = root.to_string_lossy().to_string();
        let candidate_paths: HashSet<String> = candidates
            .iter()
            .map(|c| c.path.to_string_lossy().to_string())
            .collect();
        let stored: HashSet<String> = store
            .list_files()?
            .into_iter()
            .filter(|f| options.cleanup || f.path.starts_with(&root_prefix))
            .map(|f| f.path)
            .collect();

        let mut deletions: Vec<String> = stored
            .difference(&candidate_paths)
            .cloned()
            .collect();
        deletions.sort();

        info!(
            candidates = candidates.len(),
            deletions = deletions.len(),
            "Reconciliation computed"
        );
        Ok(DirectoryPlan {
            root,
            deletions,
            candidates,
        })
    }

    /// Delete one reconciled-away path, cascading to chunks and embeddings
    pub fn delete_path(
        &self,
        store: &mut ChunkStore,
        path: &str,
        summary: &mut IndexSummary,
    ) -> IndexingResult<()> {
        if store.delete_file(path)? {
            summary.record(Path::new(path), &FileOutcome::Deleted);
        }
        Ok(())
    }

    /// Run the full pipeline for `root`
    ///
    /// # Errors
    /// `Cancelled` when the token fires at a suspension point; storage and
    /// IO failures. Per-file problems are recorded in the summary, not
    /// returned.
    pub async fn process_directory(
        &self,
        store: &mut ChunkStore,
        root: &Path,
        options: &IndexOptions,
        cancel: &CancellationToken,
    ) -> IndexingResult<IndexSummary> {
        let mut summary = IndexSummary::default();
        let plan = self.plan(store, root, options)?;

        // Deletions first
        for path in &plan.deletions {
            if cancel.is_cancelled() {
                return Err(IndexingError::Cancelled);
            }
            self.delete_path(store, path, &mut summary)?;
        }

        // Then additions and modifications
        for candidate in &plan.candidates {
            if cancel.is_cancelled() {
                return Err(IndexingError::Cancelled);
            }
            let outcome = self
                .index_candidate(store, candidate, options.force_reindex, &mut summary)
                .await;
            summary.record(&candidate.path, &outcome);
        }
        store.checkpoint()?;

        // Embedding generation runs once the store is consistent
        if !options.no_embeddings
            && let Some(table) = self.embedding_table(store)?
        {
            let bulk = summary.chunks_written > self.db_batch_size;
            if bulk {
                store.begin_bulk_load(&table)?;
            }
            let mut failed = HashSet::new();
            loop {
                if cancel.is_cancelled() {
                    return Err(IndexingError::Cancelled);
                }
                let attempted = self
                    .embed_missing_batch(store, &table, &mut failed, &mut summary)
                    .await?;
                if attempted == 0 {
                    break;
                }
            }
            if bulk {
                store.finish_bulk_load(&table)?;
            }
        }

        store.checkpoint()?;
        info!(
            added = summary.added,
            updated = summary.updated,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            skipped = summary.skipped,
            failed = summary.failed,
            "Indexing run complete"
        );
        Ok(summary)
    }

    /// Process one file, as driven by the watcher
    ///
    /// # Errors
    /// Storage failures; per-file parse problems come back as outcomes.
    pub async fn process_file(
        &self,
        store: &mut ChunkStore,
        path: &Path,
        op: FileOp,
    ) -> IndexingResult<FileOutcome> {
        if op == FileOp::Removed || !path.exists() {
            let path_str = path.to_string_lossy();
            return Ok(if store.delete_file(&path_str)? {
                FileOutcome::Deleted
            } else {
                FileOutcome::Unchanged
            });
        }

        let path = path.canonicalize()?;
        let metadata = std::fs::metadata(&path)?;
        let candidate = Candidate {
            language: chunkhound_parsing::detect_language(&path),
            size_bytes: metadata.len() as i64,
            mtime: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0.0, |d| d.as_secs_f64()),
            path,
        };

        let mut summary = IndexSummary::default();
        let outcome = self
            .index_candidate(store, &candidate, false, &mut summary)
            .await;

        // Watch-driven updates embed immediately so searches see them
        if matches!(outcome, FileOutcome::Added | FileOutcome::Updated)
            && let Some(table) = self.embedding_table(store)?
        {
            let mut failed = HashSet::new();
            while self
                .embed_missing_batch(store, &table, &mut failed, &mut summary)
                .await?
                > 0
            {}
        }
        store.maybe_checkpoint()?;
        Ok(outcome)
    }

    /// Two-tier change test, parse, and atomic chunk replacement
    pub async fn index_candidate(
        &self,
        store: &mut ChunkStore,
        candidate: &Candidate,
        force: bool,
        summary: &mut IndexSummary,
    ) -> FileOutcome {
        let path_str = candidate.path.to_string_lossy().to_string();

        let existing = match store.get_file(&path_str) {
            Ok(existing) => existing,
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        // Tier one: mtime within epsilon means unchanged, zero work
        if !force
            && let Some(stored) = &existing
            && (candidate.mtime - stored.mtime).abs() <= self.mtime_epsilon
        {
            return FileOutcome::Unchanged;
        }

        let bytes = match tokio::fs::read(&candidate.path).await {
            Ok(bytes) => bytes,
            Err(e) => return FileOutcome::Failed(format!("read failed: {e}")),
        };

        // Tier two: CRC32 over raw bytes
        let crc = content_crc32(&bytes);
        let row = NewFile {
            path: path_str.clone(),
            size_bytes: candidate.size_bytes,
            mtime: candidate.mtime,
            content_crc32: crc,
            language: candidate.language.to_string(),
        };

        if !force
            && let Some(stored) = &existing
            && stored.content_crc32 == crc
        {
            // Content identical; refresh the stored mtime so tier one
            // short-circuits next time
            if let Err(e) = store.upsert_file(&row) {
                return FileOutcome::Failed(e.to_string());
            }
            return FileOutcome::Unchanged;
        }

        if !is_supported(candidate.language) {
            // The row still exists so reconciliation sees disk == database
            if let Err(e) = store.upsert_file(&row) {
                return FileOutcome::Failed(e.to_string());
            }
            return FileOutcome::Skipped(SkipReason::Unsupported);
        }

        let chunks = match self.extractor.extract(candidate.language, &bytes) {
            Ok(chunks) => chunks,
            Err(ParsingError::Encoding) => {
                if let Err(e) = store.upsert_file(&row) {
                    return FileOutcome::Failed(e.to_string());
                }
                return FileOutcome::Skipped(SkipReason::Encoding);
            }
            Err(ParsingError::UnsupportedLanguage(_)) => {
                if let Err(e) = store.upsert_file(&row) {
                    return FileOutcome::Failed(e.to_string());
                }
                return FileOutcome::Skipped(SkipReason::Unsupported);
            }
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        let file_id = match store.upsert_file(&row) {
            Ok(id) => id,
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };
        match store.replace_file_chunks(file_id, &chunks) {
            Ok(ids) => {
                summary.chunks_written += ids.len();
            }
            Err(e) => return FileOutcome::Failed(e.to_string()),
        }
        if let Err(e) = store.touch_last_indexed(file_id) {
            warn!(path = %path_str, error = %e, "Failed to record last_indexed");
        }

        debug!(path = %path_str, chunks = chunks.len(), "File indexed");
        if existing.is_some() {
            FileOutcome::Updated
        } else {
            FileOutcome::Added
        }
    }

    /// The embedding table for the configured provider, if embeddings are
    /// enabled at all
    ///
    /// # Errors
    /// Storage failures creating or registering the table.
    pub fn embedding_table(&self, store: &mut ChunkStore) -> IndexingResult<Option<String>> {
        let Some(batcher) = &self.batcher else {
            return Ok(None);
        };
        let provider = batcher.provider();
        let table = store.ensure_embedding_table(
            provider.provider_name(),
            provider.model_name(),
            provider.dimension(),
        )?;
        Ok(Some(table))
    }

    /// Embed one batch of chunks that still lack vectors
    ///
    /// Returns how many chunks were attempted; zero means the phase is
    /// done. Unembeddable chunks (oversize inputs and the like) land in
    /// `failed` and are skipped for the rest of the run, never aborting
    /// the batch.
    ///
    /// # Errors
    /// Storage failures; per-chunk embedding failures are recorded, not
    /// returned.
    pub async fn embed_missing_batch(
        &self,
        store: &mut ChunkStore,
        table: &str,
        failed: &mut HashSet<i64>,
        summary: &mut IndexSummary,
    ) -> IndexingResult<usize> {
        let Some(batcher) = &self.batcher else {
            return Ok(0);
        };
        let dimension = batcher.provider().dimension();

        // Over-fetch past known-failed ids so one bad batch cannot shadow
        // the chunks behind it
        let fetch = self.db_batch_size + failed.len();
        let pending: Vec<(i64, String)> = store
            .chunks_missing_embeddings(table, fetch)?
            .into_iter()
            .filter(|(id, _)| !failed.contains(id))
            .take(self.db_batch_size)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending.iter().map(|(_, code)| code.clone()).collect();
        let outcome = batcher.embed(&texts).await;

        let ordered = outcome.ordered();
        let rows: Vec<(i64, &[f32])> = ordered
            .iter()
            .filter_map(|(index, vector)| {
                pending.get(*index).map(|(id, _)| (*id, vector.as_slice()))
            })
            .collect();
        if !rows.is_empty() {
            store.insert_embeddings(table, dimension, &rows)?;
            summary.embeddings_generated += rows.len();
        }

        for failure in &outcome.failures {
            if let Some((id, _)) = pending.get(failure.index) {
                warn!(chunk_id = id, error = %failure.error, "Chunk embedding failed");
                failed.insert(*id);
                summary.embedding_failures += 1;
            }
        }

        // Anything neither embedded nor reported failed (blank input
        // indices) must not spin the loop forever
        for (index, (id, _)) in pending.iter().enumerate() {
            if !outcome.vectors.contains_key(&index)
                && !outcome.failures.iter().any(|f| f.index == index)
            {
                failed.insert(*id);
            }
        }

        Ok(pending.len())
    }
}
