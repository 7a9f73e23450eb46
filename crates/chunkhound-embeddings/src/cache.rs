//! Content-fingerprint cache for embeddings
//!
//! Keyed by a stable hash of the chunk text scoped to the current
//! (provider, model) pair, so identical text across re-indexes never
//! reaches the vectorizer twice. Process-local, bounded by entry count
//! with LRU eviction.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Stable content fingerprint of a chunk text
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

type CacheInner = LruCache<String, Arc<Vec<f32>>>;

/// LRU cache of vectors keyed by (provider, model, fingerprint)
pub struct FingerprintCache {
    inner: Mutex<CacheInner>,
}

impl FingerprintCache {
    /// Create a cache bounded to `capacity` entries (minimum one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(provider: &str, model: &str, text: &str) -> String {
        format!("{provider}:{model}:{}", fingerprint(text))
    }

    /// Look up a cached vector for this text under the current model
    pub fn get(&self, provider: &str, model: &str, text: &str) -> Option<Arc<Vec<f32>>> {
        let key = Self::key(provider, model, text);
        self.inner.lock().ok()?.get(&key).map(Arc::clone)
    }

    /// Store a freshly generated vector
    pub fn put(&self, provider: &str, model: &str, text: &str, vector: Arc<Vec<f32>>) {
        let key = Self::key(provider, model, text);
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key, vector);
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
