//! Durable storage and query engine for ChunkHound
//!
//! A single-writer DuckDB database holds files, chunks, and one embedding
//! table per (provider, model, dimension), with an HNSW index per embedding
//! table. The write-ahead log is not synchronized on commit, so every
//! mutation path runs under an explicit checkpoint policy, and startup
//! carries a WAL recovery protocol for the case where the log references
//! the vector index type before the extension is loaded.

pub mod error;
pub mod models;
pub mod search;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use models::{
    EmbeddingTableInfo, FileRecord, NewFile, Pagination, SearchPage, SearchResultRow, StoreStats,
};
pub use search::{validate_path_filter, RegexSearchRequest, SemanticSearchRequest};
pub use store::{ChunkStore, CheckpointPolicy};
