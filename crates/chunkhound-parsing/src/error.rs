//! Parsing error types

use thiserror::Error;

/// Errors produced while extracting chunks from source bytes
#[derive(Error, Debug)]
pub enum ParsingError {
    /// File bytes are not valid UTF-8 (after BOM stripping)
    ///
    /// Callers treat this as `skipped(reason=encoding)`, not a failure.
    #[error("File is not valid UTF-8")]
    Encoding,

    /// The language tag has no registered extractor
    ///
    /// Callers treat this as `skipped(reason=unsupported)`.
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Tree-sitter query compilation failed for a registry entry
    #[error("Query compilation failed for {language}: {message}")]
    Query { language: String, message: String },

    /// The grammar could not be loaded into a parser
    #[error("Failed to initialize parser for {0}")]
    ParserInit(String),

    /// Generic error message
    #[error("Parsing error: {0}")]
    Other(String),
}

/// Result type for parsing operations
pub type ParsingResult<T> = Result<T, ParsingError>;
