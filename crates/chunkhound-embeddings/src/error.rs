//! Embedding error types
//!
//! Token-limit recovery is expressed as data: the batcher matches on
//! `TokenLimit` and redistributes rather than unwinding, so the variants
//! here are part of the batching algorithm's contract. Variants are `Clone`
//! because one failed dispatch marks every input in the batch.

use thiserror::Error;

/// Errors produced while generating embeddings
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    /// The provider rejected a request as exceeding its context length
    #[error("Request exceeds provider token limit ({limit})")]
    TokenLimit {
        /// The provider's token budget per request
        limit: usize,
    },

    /// A single text that cannot be split further still exceeds the limit
    #[error("Text cannot be reduced under the provider token limit")]
    OversizeText,

    /// Provider asked us to slow down
    #[error("Provider rate limited the request")]
    RateLimited,

    /// Transport-level failure talking to the provider
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider returned a non-success status with a message
    #[error("Provider error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider response did not match the expected shape
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Missing credentials or invalid provider configuration
    #[error("Embedding configuration error: {0}")]
    Config(String),

    /// Generic error message
    #[error("Embedding error: {0}")]
    Other(String),
}

impl EmbeddingError {
    /// Whether retrying the same request may succeed
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Http(_) | Self::Api { status: 500..=599, .. }
        )
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EmbeddingError::RateLimited.is_transient());
        assert!(EmbeddingError::Http("reset".to_string()).is_transient());
        assert!(
            EmbeddingError::Api {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_transient()
        );
        assert!(
            !EmbeddingError::Api {
                status: 400,
                message: "bad".to_string()
            }
            .is_transient()
        );
        assert!(!EmbeddingError::TokenLimit { limit: 8192 }.is_transient());
        assert!(!EmbeddingError::OversizeText.is_transient());
    }
}
