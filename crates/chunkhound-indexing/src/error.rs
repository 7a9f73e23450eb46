//! Indexing error types

use thiserror::Error;

/// Errors produced by the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Filesystem error during discovery or file reads
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage engine failure
    #[error(transparent)]
    Storage(#[from] chunkhound_storage::StorageError),

    /// Chunk extraction failure that is not a skip condition
    #[error(transparent)]
    Parsing(#[from] chunkhound_parsing::ParsingError),

    /// Invalid include/exclude glob
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// The run was cancelled at a suspension point
    #[error("Indexing cancelled")]
    Cancelled,

    /// Generic error message
    #[error("Indexing error: {0}")]
    Other(String),
}

/// Result type for indexing operations
pub type IndexingResult<T> = Result<T, IndexingError>;
