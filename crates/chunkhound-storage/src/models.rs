//! Storage data model: rows, statistics, and search response envelopes

use serde::{Deserialize, Serialize};

/// A file row as persisted in the store
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    /// Canonical absolute path
    pub path: String,
    pub size_bytes: i64,
    /// Modification time, floating seconds since epoch
    pub mtime: f64,
    /// CRC32 of the raw bytes, stored as a wide integer
    pub content_crc32: u32,
    pub language: String,
    /// When the path was first discovered, seconds since epoch
    pub first_seen: f64,
    /// When the file's chunks were last rebuilt; `None` until the first
    /// successful parse lands
    pub last_indexed: Option<f64>,
}

/// Attributes for creating or updating a file row
#[derive(Debug, Clone)]
pub struct NewFile {
    pub path: String,
    pub size_bytes: i64,
    pub mtime: f64,
    pub content_crc32: u32,
    pub language: String,
}

/// One registered embedding table
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingTableInfo {
    pub table_name: String,
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub vector_count: u64,
}

/// Aggregate statistics over the store
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub files: u64,
    pub chunks: u64,
    pub embeddings_by_model: Vec<EmbeddingTableInfo>,
}

/// Pagination envelope carried by every search response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub page_size: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultRow {
    pub file: String,
    pub chunk_id: i64,
    pub chunk_kind: String,
    pub symbol: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
    /// Cosine similarity; present for semantic hits only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl SearchResultRow {
    /// Approximate serialized size, used for the response-size guardrail
    pub fn approximate_size(&self) -> usize {
        // Fixed envelope overhead plus the variable-length fields
        64 + self.file.len() + self.symbol.len() + self.code.len() + self.chunk_kind.len()
    }
}

/// A page of search results plus its pagination envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<SearchResultRow>,
    pub pagination: Pagination,
}
