//! OpenAI-compatible HTTP embedding provider
//!
//! Talks to any endpoint implementing the `/embeddings` API shape. The
//! provider only translates wire failures into the typed taxonomy; batching
//! and recovery live in the batcher.

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use chunkhound_config::EmbeddingConfig;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Remote vectorizer speaking the OpenAI embeddings wire format
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    max_batch_len: usize,
    max_batch_tokens: usize,
}

impl OpenAiProvider {
    /// Build a provider from embedding configuration
    ///
    /// # Errors
    /// `EmbeddingError::Config` when the credential variable is unset.
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| EmbeddingError::Config(format!("{API_KEY_VAR} is not set")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dimension: config.dimensions,
            max_batch_len: config.batch_size,
            max_batch_tokens: config.batch_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

fn is_context_length_error(body: &ApiErrorBody) -> bool {
    if body.code.as_deref() == Some("context_length_exceeded") {
        return true;
    }
    let message = body.message.to_ascii_lowercase();
    message.contains("context length") || message.contains("maximum context")
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let request_body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|r| r.error)
                .unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(EmbeddingError::RateLimited);
            }
            if status.as_u16() == 400 && is_context_length_error(&body) {
                return Err(EmbeddingError::TokenLimit {
                    limit: self.max_batch_tokens,
                });
            }
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message: if body.message.is_empty() {
                    text.chars().take(200).collect()
                } else {
                    body.message
                },
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|o| o.index);

        for object in &data {
            if object.embedding.len() != self.dimension {
                return Err(EmbeddingError::MalformedResponse(format!(
                    "expected dimension {}, got {}",
                    self.dimension,
                    object.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|o| o.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_len(&self) -> usize {
        self.max_batch_len
    }

    fn max_batch_tokens(&self) -> usize {
        self.max_batch_tokens
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
