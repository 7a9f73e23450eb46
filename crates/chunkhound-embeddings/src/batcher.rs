//! Token-bounded embedding batcher
//!
//! `embed` consults the content-fingerprint cache, filters blank inputs,
//! groups the rest into batches under the provider's token and count limits,
//! and dispatches with bounded concurrency. Token-limit rejections are
//! handled by a redistribution work loop: a rejected batch is split into
//! `ceil(estimated / budget)` even sub-batches and requeued; a rejected
//! singleton is split at an estimated token boundary per the oversize
//! policy. An unrecoverable failure marks only its own inputs.

use crate::cache::FingerprintCache;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::estimator::{TokenEstimator, OVERHEAD_PER_ITEM};
use crate::traits::EmbeddingProvider;
use chunkhound_config::{EmbeddingConfig, OversizePolicy};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// One input that could not be embedded
#[derive(Debug)]
pub struct IndexedFailure {
    /// Position in the input slice passed to `embed`
    pub index: usize,
    pub error: EmbeddingError,
}

/// Partial result of an embed call
///
/// Inputs that were blank after trimming appear in neither map; callers get
/// a partial map back, never a placeholder vector.
#[derive(Debug, Default)]
pub struct EmbeddingOutcome {
    /// Vectors by input index
    pub vectors: HashMap<usize, Arc<Vec<f32>>>,
    /// Per-input unrecoverable failures
    pub failures: Vec<IndexedFailure>,
}

impl EmbeddingOutcome {
    /// Successful vectors sorted by input index
    pub fn ordered(&self) -> Vec<(usize, Arc<Vec<f32>>)> {
        let mut pairs: Vec<_> = self
            .vectors
            .iter()
            .map(|(i, v)| (*i, Arc::clone(v)))
            .collect();
        pairs.sort_by_key(|(i, _)| *i);
        pairs
    }
}

/// A group of inputs dispatched as one provider request
#[derive(Debug, Clone)]
struct Batch {
    indices: Vec<usize>,
    texts: Vec<String>,
}

impl Batch {
    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Groups chunk texts into token-bounded batches and dispatches them
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    estimator: TokenEstimator,
    cache: Arc<FingerprintCache>,
    max_concurrent: usize,
    max_retries: usize,
    oversize_policy: OversizePolicy,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            estimator: TokenEstimator::new(),
            cache: Arc::new(FingerprintCache::new(config.fingerprint_cache_capacity)),
            max_concurrent: config.max_concurrent.max(1),
            max_retries: config.max_retries,
            oversize_policy: config.oversize_policy,
        }
    }

    /// Share an existing fingerprint cache (one cache per engine context)
    pub fn with_cache(mut self, cache: Arc<FingerprintCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    /// Embed a list of texts, returning a partial map of vectors
    ///
    /// Vectors preserve input order when iterated via `ordered`. Cache hits
    /// never reach the provider; blank inputs are absent from the result.
    pub async fn embed(&self, texts: &[String]) -> EmbeddingOutcome {
        let mut outcome = EmbeddingOutcome::default();
        let provider_name = self.provider.provider_name().to_string();
        let model_name = self.provider.model_name().to_string();

        // Cache consultation and blank filtering happen before batching
        let mut pending: Vec<(usize, &String)> = Vec::new();
        for (index, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            if let Some(vector) = self.cache.get(&provider_name, &model_name, text) {
                outcome.vectors.insert(index, vector);
            } else {
                pending.push((index, text));
            }
        }

        if pending.is_empty() {
            return outcome;
        }

        let batches = self.plan_batches(&pending);
        debug!(
            inputs = pending.len(),
            batches = batches.len(),
            "Dispatching embedding batches"
        );

        let results: Vec<Vec<(usize, EmbeddingResult<Vec<f32>>)>> = stream::iter(batches)
            .map(|batch| self.run_batch(batch))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for (index, result) in results.into_iter().flatten() {
            match result {
                Ok(vector) => {
                    let vector = Arc::new(vector);
                    if let Some(text) = texts.get(index) {
                        self.cache
                            .put(&provider_name, &model_name, text, Arc::clone(&vector));
                    }
                    outcome.vectors.insert(index, vector);
                }
                Err(error) => {
                    warn!(index, %error, "Embedding input failed");
                    outcome.failures.push(IndexedFailure { index, error });
                }
            }
        }

        outcome
    }

    /// Accumulate inputs while both the token and count bounds hold
    fn plan_batches(&self, pending: &[(usize, &String)]) -> Vec<Batch> {
        let token_budget = self.provider.max_batch_tokens();
        let count_limit = self.provider.max_batch_len().max(1);

        let mut batches = Vec::new();
        let mut current = Batch {
            indices: Vec::new(),
            texts: Vec::new(),
        };
        let mut current_tokens = 0usize;

        for (index, text) in pending {
            let item_tokens = self.estimator.estimate(text) + OVERHEAD_PER_ITEM;
            let over_tokens = !current.indices.is_empty()
                && current_tokens + item_tokens >= token_budget;
            let over_count = current.len() >= count_limit;

            if over_tokens || over_count {
                batches.push(std::mem::replace(
                    &mut current,
                    Batch {
                        indices: Vec::new(),
                        texts: Vec::new(),
                    },
                ));
                current_tokens = 0;
            }

            current.indices.push(*index);
            current.texts.push((*text).clone());
            current_tokens += item_tokens;
        }

        if !current.indices.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Dispatch one batch, redistributing on token-limit rejections
    ///
    /// The recovery path is a work loop over sub-batches, not recursion: a
    /// rejected batch of n > 1 inputs is split into `ceil(estimated /
    /// budget)` even parts and requeued; a rejected singleton goes through
    /// the oversize split.
    async fn run_batch(&self, batch: Batch) -> Vec<(usize, EmbeddingResult<Vec<f32>>)> {
        let token_budget = self.provider.max_batch_tokens().max(1);
        let mut results = Vec::with_capacity(batch.len());
        let mut queue = VecDeque::from([batch]);

        while let Some(current) = queue.pop_front() {
            let refs: Vec<&str> = current.texts.iter().map(String::as_str).collect();
            match self.dispatch_with_retry(&refs).await {
                Ok(vectors) => {
                    for (index, vector) in current.indices.iter().zip(vectors) {
                        results.push((*index, Ok(vector)));
                    }
                }
                Err(EmbeddingError::TokenLimit { .. }) if current.len() > 1 => {
                    let estimated = self.estimator.estimate_batch(&refs);
                    let k = estimated
                        .div_ceil(token_budget)
                        .max(2)
                        .min(current.len());
                    debug!(
                        inputs = current.len(),
                        estimated, parts = k, "Token limit hit, redistributing batch"
                    );
                    queue.extend(split_even(current, k));
                }
                Err(EmbeddingError::TokenLimit { .. }) => {
                    // Down to one text: split it by token boundary
                    let index = current.indices[0];
                    let result = self.embed_oversize(&current.texts[0]).await;
                    results.push((index, result));
                }
                Err(error) => {
                    for index in &current.indices {
                        results.push((*index, Err(error.clone())));
                    }
                }
            }
        }

        results
    }

    /// Retry transient failures with exponential backoff, bounded attempts
    async fn dispatch_with_retry(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut attempt = 0usize;
        loop {
            match self.provider.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt as u32);
                    warn!(attempt, %e, "Transient embedding failure, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Embed a single text that exceeds the per-request limit
    ///
    /// Splits at estimated token boundaries; the result is the first
    /// sub-text's vector or the mean of all sub-text vectors, per policy.
    /// Yielding no progress (one part) fails with `OversizeText`.
    async fn embed_oversize(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let budget = self
            .provider
            .max_batch_tokens()
            .saturating_sub(OVERHEAD_PER_ITEM)
            .max(1);

        let mut parts: Vec<&str> = Vec::new();
        let mut remaining = text;
        while !remaining.is_empty() {
            let cut = self.estimator.split_point(remaining, budget);
            if cut == 0 || cut >= remaining.len() {
                parts.push(remaining);
                break;
            }
            let (head, tail) = remaining.split_at(cut);
            parts.push(head);
            remaining = tail;
        }

        if parts.len() <= 1 {
            return Err(EmbeddingError::OversizeText);
        }

        match self.oversize_policy {
            OversizePolicy::FirstChunk => {
                let first = parts.first().copied().unwrap_or_default();
                let mut vectors = self.try_embed_parts(&[first]).await?;
                vectors.pop().ok_or(EmbeddingError::OversizeText)
            }
            OversizePolicy::MeanOfParts => {
                let vectors = self.try_embed_parts(&parts).await?;
                Ok(mean_vector(&vectors))
            }
        }
    }

    /// Embed oversize sub-texts; a further token rejection means the split
    /// made no real progress
    async fn try_embed_parts(&self, parts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self.dispatch_with_retry(parts).await {
            Ok(vectors) => Ok(vectors),
            Err(EmbeddingError::TokenLimit { .. }) => Err(EmbeddingError::OversizeText),
            Err(e) => Err(e),
        }
    }
}

/// Split a batch into `k` consecutive, evenly sized sub-batches
fn split_even(batch: Batch, k: usize) -> Vec<Batch> {
    let n = batch.len();
    let k = k.clamp(1, n);
    let base = n / k;
    let extra = n % k;

    let mut parts = Vec::with_capacity(k);
    let mut indices = batch.indices.into_iter();
    let mut texts = batch.texts.into_iter();

    for i in 0..k {
        let size = base + usize::from(i < extra);
        parts.push(Batch {
            indices: indices.by_ref().take(size).collect(),
            texts: texts.by_ref().take(size).collect(),
        });
    }
    parts
}

/// Element-wise mean of a set of equal-length vectors
fn mean_vector(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; first.len()];
    for vector in vectors {
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    let count = vectors.len() as f32;
    for value in &mut sum {
        *value /= count;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock provider with an advertised token limit and a separate actual
    /// rejection threshold, mimicking the real-world gap between the
    /// batcher's estimates and a provider's tokenizer
    struct MockProvider {
        dimension: usize,
        max_batch_len: usize,
        advertised_tokens: usize,
        reject_over: usize,
        calls: AtomicUsize,
        transient_failures: AtomicUsize,
    }

    impl MockProvider {
        fn new(advertised_tokens: usize, reject_over: usize) -> Self {
            Self {
                dimension: 4,
                max_batch_len: 64,
                advertised_tokens,
                reject_over,
                calls: AtomicUsize::new(0),
                transient_failures: AtomicUsize::new(0),
            }
        }

        fn with_transient_failures(self, n: usize) -> Self {
            self.transient_failures.store(n, Ordering::SeqCst);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        // The mock's own tokenizer-ish count; deliberately not identical to
        // the batcher's estimator
        fn rough_tokens(texts: &[&str]) -> usize {
            texts.iter().map(|t| t.len() / 4 + 1).sum()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockProvider {
        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let failures = self.transient_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.transient_failures.store(failures - 1, Ordering::SeqCst);
                return Err(EmbeddingError::RateLimited);
            }

            if Self::rough_tokens(texts) > self.reject_over {
                return Err(EmbeddingError::TokenLimit {
                    limit: self.advertised_tokens,
                });
            }

            Ok(texts
                .iter()
                .map(|t| {
                    let len = t.len() as f32;
                    vec![len, len + 1.0, len + 2.0, len + 3.0]
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_batch_len(&self) -> usize {
            self.max_batch_len
        }

        fn max_batch_tokens(&self) -> usize {
            self.advertised_tokens
        }

        fn provider_name(&self) -> &str {
            "mock"
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    fn batcher_with(provider: Arc<MockProvider>) -> EmbeddingBatcher {
        let config = EmbeddingConfig {
            batch_tokens: provider.advertised_tokens,
            batch_size: provider.max_batch_len,
            max_retries: 3,
            ..EmbeddingConfig::default()
        };
        EmbeddingBatcher::new(provider, &config)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn embeds_all_inputs_in_order() {
        let provider = Arc::new(MockProvider::new(100_000, 100_000));
        let batcher = batcher_with(Arc::clone(&provider));

        let inputs = texts(&["alpha", "beta", "gamma"]);
        let outcome = batcher.embed(&inputs).await;

        assert!(outcome.failures.is_empty());
        let ordered = outcome.ordered();
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0].0, 0);
        assert_eq!(ordered[2].0, 2);
        assert_eq!(ordered[0].1[0], 5.0); // "alpha".len()
    }

    #[tokio::test]
    async fn blank_inputs_are_absent_not_failed() {
        let provider = Arc::new(MockProvider::new(100_000, 100_000));
        let batcher = batcher_with(provider);

        let inputs = texts(&["real", "   ", "", "\t\n"]);
        let outcome = batcher.embed(&inputs).await;

        assert_eq!(outcome.vectors.len(), 1);
        assert!(outcome.vectors.contains_key(&0));
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn second_embed_is_served_from_cache() {
        let provider = Arc::new(MockProvider::new(100_000, 100_000));
        let batcher = batcher_with(Arc::clone(&provider));

        let inputs = texts(&["one", "two"]);
        batcher.embed(&inputs).await;
        let first_calls = provider.call_count();
        assert!(first_calls >= 1);

        let outcome = batcher.embed(&inputs).await;
        assert_eq!(provider.call_count(), first_calls);
        assert_eq!(outcome.vectors.len(), 2);
    }

    #[tokio::test]
    async fn token_limit_redistributes_until_success() {
        // The provider advertises a bigger budget than it actually honors,
        // so the planned batch is rejected and must be redistributed down
        // to sub-batches the provider accepts
        let provider = Arc::new(MockProvider::new(200, 30));
        let batcher = batcher_with(Arc::clone(&provider));

        let inputs: Vec<String> = (0..8)
            .map(|i| format!("some source text {i} {}", "x".repeat(40)))
            .collect();
        let outcome = batcher.embed(&inputs).await;

        assert!(outcome.failures.is_empty(), "failures: {:?}", outcome.failures);
        assert_eq!(outcome.vectors.len(), 8);
        // At least one rejection happened before the redistributed
        // sub-batches went through
        assert!(provider.call_count() > inputs.len() / 4);
    }

    #[tokio::test]
    async fn oversize_singleton_fails_alone() {
        // Rejection threshold well under the advertised budget: even the
        // first token-bounded sub-text of the giant input stays over it
        let provider = Arc::new(MockProvider::new(50, 30));
        let batcher = batcher_with(Arc::clone(&provider));

        // 49 normal chunks and one 200k-character blob
        let mut inputs: Vec<String> = (0..49).map(|i| format!("chunk {i}")).collect();
        inputs.push("Z".repeat(200_000));

        let outcome = batcher.embed(&inputs).await;

        assert_eq!(outcome.vectors.len(), 49);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 49);
        assert!(matches!(
            outcome.failures[0].error,
            EmbeddingError::OversizeText
        ));
    }

    #[tokio::test]
    async fn oversize_with_whitespace_embeds_first_part() {
        // Provider honors more than it advertises, so the first sub-text
        // produced by the token-boundary split goes through
        let provider = Arc::new(MockProvider::new(200, 300));
        let batcher = batcher_with(provider);

        let inputs = vec!["word ".repeat(2_000)];
        let outcome = batcher.embed(&inputs).await;

        assert!(outcome.failures.is_empty(), "failures: {:?}", outcome.failures);
        assert_eq!(outcome.vectors.len(), 1);
    }

    #[tokio::test]
    async fn transient_errors_retry_then_succeed() {
        let provider = Arc::new(MockProvider::new(100_000, 100_000).with_transient_failures(2));
        let batcher = batcher_with(Arc::clone(&provider));

        let inputs = texts(&["hello"]);
        let outcome = batcher.embed(&inputs).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.vectors.len(), 1);
        assert_eq!(provider.call_count(), 3); // two failures plus success
    }

    #[test]
    fn split_even_distributes_remainder() {
        let batch = Batch {
            indices: (0..7).collect(),
            texts: (0..7).map(|i| i.to_string()).collect(),
        };
        let parts = split_even(batch, 3);
        let sizes: Vec<usize> = parts.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        let all: Vec<usize> = parts.iter().flat_map(|p| p.indices.clone()).collect();
        assert_eq!(all, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn mean_vector_averages_elementwise() {
        let mean = mean_vector(&[vec![1.0, 3.0], vec![3.0, 5.0]]);
        assert_eq!(mean, vec![2.0, 4.0]);
    }
}
