//! Semantic chunk extraction for ChunkHound
//!
//! This crate turns raw source bytes into ordered, semantically meaningful
//! chunks (functions, classes, comments, docstrings, markdown sections).
//! Tree-sitter grammars do the heavy lifting; a compile-time language
//! registry maps grammar node kinds onto the fixed `ChunkKind` enumeration,
//! and a generic routine handles comment extraction, symbol fallback, and
//! oversize splitting so new languages only add a kind map.

pub mod chunk;
pub mod error;
pub mod extractor;
pub mod languages;
pub mod markdown;
pub mod split;

pub use chunk::{Chunk, ChunkKind};
pub use error::{ParsingError, ParsingResult};
pub use extractor::ChunkExtractor;
pub use languages::{detect_language, get_language_config, is_supported, LanguageConfig};
pub use split::MAX_CHUNK_CHARS;
