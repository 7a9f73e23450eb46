//! Trait abstraction for embedding providers
//!
//! A provider is a remote vectorizer behind an interface: it accepts a batch
//! of texts and returns one dense vector per text. The batcher interrogates
//! the provider's limits and handles grouping and recovery; providers only
//! translate wire-level failures into the typed error taxonomy.

use crate::EmbeddingResult;
use async_trait::async_trait;

/// Trait for embedding generation providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts
    ///
    /// Returns one vector per input text, aligned to input order.
    ///
    /// # Errors
    /// `TokenLimit` when the provider rejects the batch as too large (the
    /// batcher redistributes), transient variants for retryable failures.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Dimensionality of vectors produced by this provider's model
    fn dimension(&self) -> usize;

    /// Maximum number of inputs per request (the provider's count limit)
    fn max_batch_len(&self) -> usize;

    /// Token budget per request
    fn max_batch_tokens(&self) -> usize;

    /// Provider tag (e.g. "openai")
    fn provider_name(&self) -> &str;

    /// Model identifier (e.g. "text-embedding-3-small")
    fn model_name(&self) -> &str;
}
