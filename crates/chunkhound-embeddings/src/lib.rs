//! Embedding generation for ChunkHound
//!
//! This crate turns chunk texts into dense vectors through a remote
//! vectorizer, grouping texts into token-bounded batches, short-circuiting
//! through a content-fingerprint cache, and recovering from provider token
//! limits by recursive redistribution expressed as a data-driven loop.

pub mod batcher;
pub mod cache;
pub mod error;
pub mod estimator;
pub mod openai;
pub mod traits;

pub use batcher::{EmbeddingBatcher, EmbeddingOutcome, IndexedFailure};
pub use cache::FingerprintCache;
pub use error::{EmbeddingError, EmbeddingResult};
pub use estimator::TokenEstimator;
pub use openai::OpenAiProvider;
pub use traits::EmbeddingProvider;
