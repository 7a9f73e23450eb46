//! Storage error types

use thiserror::Error;

/// Errors produced by the storage engine
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// The write-ahead log could not be replayed and recovery failed
    #[error("WAL recovery failed: {0}")]
    WalRecovery(String),

    /// A path filter failed validation (traversal, absolute path, ...)
    #[error("Invalid path filter: {0}")]
    InvalidPathFilter(String),

    /// A vector had the wrong dimension or was not usable for cosine distance
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Vector search requested but the ANN extension is not loaded
    #[error("Vector search unavailable: {0}")]
    AnnUnavailable(String),

    /// Filesystem error around the database and its WAL sibling
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error message
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
