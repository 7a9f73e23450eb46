//! Regex and semantic search over the store
//!
//! Regex patterns match within a single chunk's code text only; a pattern
//! spanning two chunks will not match across the boundary. That limit is
//! architectural, not a bug: chunks are the atomic unit of indexing and of
//! every search result.

use crate::error::{StorageError, StorageResult};
use crate::models::{Pagination, SearchPage, SearchResultRow};
use crate::store::{vector_literal, ChunkStore};
use duckdb::params;
use tracing::debug;

/// Parameters for a regex search
#[derive(Debug, Clone)]
pub struct RegexSearchRequest {
    pub pattern: String,
    /// Relative-path substring, validated before use
    pub path_filter: Option<String>,
    pub limit: usize,
    pub offset: usize,
    /// Serialized response-size cap in bytes
    pub max_response_bytes: Option<usize>,
}

/// Parameters for a semantic search (the query is already embedded)
#[derive(Debug, Clone)]
pub struct SemanticSearchRequest {
    pub table: String,
    pub dimension: usize,
    pub query_vector: Vec<f32>,
    pub path_filter: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub threshold: Option<f32>,
    pub max_response_bytes: Option<usize>,
}

/// Validate and normalize a path filter
///
/// Rejects traversal (`..`), home expansion (`~`), absolute paths, and
/// drive-letter prefixes; normalizes separators to forward slashes. The
/// result is applied as a `LIKE %…%` over the canonical file path.
///
/// # Errors
/// `StorageError::InvalidPathFilter` with the offending input.
pub fn validate_path_filter(filter: &str) -> StorageResult<String> {
    let normalized = filter.replace('\\', "/");
    let rejected = normalized.starts_with('/')
        || normalized.starts_with('~')
        || normalized.contains(':')
        || normalized
            .split('/')
            .any(|segment| segment == "..");
    if rejected || normalized.trim().is_empty() {
        return Err(StorageError::InvalidPathFilter(filter.to_string()));
    }
    Ok(normalized)
}

/// Escape LIKE metacharacters so filters match literally
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl ChunkStore {
    /// Regex search over chunk code text
    ///
    /// Deterministic order: (file path, start line, chunk id). Pagination is
    /// offset/limit; `has_more` is detected by over-fetching one row, and
    /// the response-size guardrail can return fewer rows than `limit` with
    /// a `next_offset` that resumes correctly.
    pub fn search_regex(&self, request: &RegexSearchRequest) -> StorageResult<SearchPage> {
        let filter = request
            .path_filter
            .as_deref()
            .map(validate_path_filter)
            .transpose()?;

        let mut sql = String::from(
            "SELECT f.path, c.id, c.kind, c.symbol, c.start_line, c.end_line, c.code
             FROM chunks c
             JOIN files f ON f.id = c.file_id
             WHERE regexp_matches(c.code, ?)",
        );
        if filter.is_some() {
            sql.push_str(" AND f.path LIKE ? ESCAPE '\\'");
        }
        sql.push_str(" ORDER BY f.path, c.start_line, c.id LIMIT ? OFFSET ?");

        // Over-fetch one row to detect a following page
        let fetch = request.limit.saturating_add(1) as i64;
        let offset = request.offset as i64;

        let mut stmt = self.connection().prepare(&sql)?;
        let rows: Vec<SearchResultRow> = match &filter {
            Some(f) => stmt
                .query_map(
                    params![request.pattern, format!("%{}%", escape_like(f)), fetch, offset],
                    row_without_score,
                )?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map(params![request.pattern, fetch, offset], row_without_score)?
                .collect::<Result<_, _>>()?,
        };

        debug!(
            pattern = %request.pattern,
            fetched = rows.len(),
            "Regex search executed"
        );
        Ok(paginate(
            rows,
            request.limit,
            request.offset,
            request.max_response_bytes,
        ))
    }

    /// Semantic search against one embedding table
    ///
    /// Top-k by descending cosine similarity with a stable chunk-id
    /// tie-break. Pagination across concurrent index mutations is
    /// best-effort: the HNSW index is not frozen between pages.
    pub fn search_semantic(&self, request: &SemanticSearchRequest) -> StorageResult<SearchPage> {
        if !self.ann_ready() {
            return Err(StorageError::AnnUnavailable(
                "vss extension is not loaded".to_string(),
            ));
        }
        let filter = request
            .path_filter
            .as_deref()
            .map(validate_path_filter)
            .transpose()?;

        let literal = vector_literal(&request.query_vector);
        let dimension = request.dimension;
        let table = &request.table;

        let mut sql = format!(
            "SELECT path, id, kind, symbol, start_line, end_line, code, score FROM (
                 SELECT f.path AS path, c.id AS id, c.kind AS kind, c.symbol AS symbol,
                        c.start_line AS start_line, c.end_line AS end_line, c.code AS code,
                        array_cosine_similarity(e.vector, {literal}::FLOAT[{dimension}]) AS score
                 FROM {table} e
                 JOIN chunks c ON c.id = e.chunk_id
                 JOIN files f ON f.id = c.file_id"
        );
        if filter.is_some() {
            sql.push_str(" WHERE f.path LIKE ? ESCAPE '\\'");
        }
        sql.push_str(") WHERE score IS NOT NULL");
        if request.threshold.is_some() {
            sql.push_str(" AND score >= ?");
        }
        sql.push_str(" ORDER BY score DESC, id LIMIT ? OFFSET ?");

        let fetch = request.limit.saturating_add(1) as i64;
        let offset = request.offset as i64;

        let mut stmt = self.connection().prepare(&sql)?;
        let rows: Vec<SearchResultRow> = match (&filter, request.threshold) {
            (Some(f), Some(t)) => stmt
                .query_map(
                    params![format!("%{}%", escape_like(f)), f64::from(t), fetch, offset],
                    row_with_score,
                )?
                .collect::<Result<_, _>>()?,
            (Some(f), None) => stmt
                .query_map(
                    params![format!("%{}%", escape_like(f)), fetch, offset],
                    row_with_score,
                )?
                .collect::<Result<_, _>>()?,
            (None, Some(t)) => stmt
                .query_map(params![f64::from(t), fetch, offset], row_with_score)?
                .collect::<Result<_, _>>()?,
            (None, None) => stmt
                .query_map(params![fetch, offset], row_with_score)?
                .collect::<Result<_, _>>()?,
        };

        Ok(paginate(
            rows,
            request.limit,
            request.offset,
            request.max_response_bytes,
        ))
    }
}

fn row_without_score(row: &duckdb::Row<'_>) -> duckdb::Result<SearchResultRow> {
    Ok(SearchResultRow {
        file: row.get(0)?,
        chunk_id: row.get(1)?,
        chunk_kind: row.get(2)?,
        symbol: row.get(3)?,
        start_line: row.get::<_, i64>(4)? as usize,
        end_line: row.get::<_, i64>(5)? as usize,
        code: row.get(6)?,
        score: None,
    })
}

fn row_with_score(row: &duckdb::Row<'_>) -> duckdb::Result<SearchResultRow> {
    let mut result = row_without_score(row)?;
    result.score = Some(row.get::<_, f32>(7)?);
    Ok(result)
}

/// Build the pagination envelope from over-fetched rows, applying the
/// serialized-size guardrail
fn paginate(
    mut rows: Vec<SearchResultRow>,
    limit: usize,
    offset: usize,
    max_response_bytes: Option<usize>,
) -> SearchPage {
    let mut has_more = rows.len() > limit;
    rows.truncate(limit);

    if let Some(cap) = max_response_bytes {
        let mut total = 0usize;
        let mut keep = 0usize;
        for row in &rows {
            total += row.approximate_size();
            if keep > 0 && total > cap {
                break;
            }
            keep += 1;
        }
        if keep < rows.len() {
            rows.truncate(keep);
            has_more = true;
        }
    }

    let page_size = rows.len();
    SearchPage {
        results: rows,
        pagination: Pagination {
            offset,
            page_size,
            has_more,
            next_offset: has_more.then(|| offset + page_size),
            total: None,
        },
    }
}
