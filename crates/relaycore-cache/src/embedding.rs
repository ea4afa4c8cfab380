//! Pluggable embedding sources for the semantic cache, plus the
//! deterministic local fallback and a bounded cache of already-computed
//! embeddings keyed by input hash.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Dimensionality of the local hash-based fallback embedding.
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Maximum number of already-computed embeddings to keep cached.
const MAX_EMBEDDING_CACHE_ENTRIES: usize = 1000;

/// A source of text embeddings. An external implementation (backed by an
/// embeddings API) lives in `relaycore-integrations`; [`LocalEmbeddingProvider`]
/// is the deterministic, network-free fallback.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute an embedding vector for `text`.
    async fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic fallback: SHA-256 the input, expand the digest into a
/// 384-dimensional vector normalized to `[-1, 1]`. Produces the same
/// vector for the same text every time, so the cache is testable without
/// a network dependency.
#[derive(Debug, Default)]
pub struct LocalEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Vec<f32> {
        local_embedding(text)
    }
}

/// Compute the deterministic local embedding directly, without going
/// through the `EmbeddingProvider` trait object.
#[must_use]
pub fn local_embedding(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    (0..LOCAL_EMBEDDING_DIM)
        .map(|i| {
            let byte = digest[i % digest.len()];
            // Spread [0, 255] onto [-1, 1].
            (f32::from(byte) / 127.5) - 1.0
        })
        .collect()
}

/// Cosine similarity between two vectors. A zero-norm vector (e.g. an
/// all-zero embedding) never matches anything — returns `0.0` rather than
/// dividing by zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Fronts an [`EmbeddingProvider`] with a bounded, insertion-order-evicted
/// cache keyed by the SHA-256 of the input text.
pub struct CachingEmbedder<P: EmbeddingProvider> {
    inner: P,
    cache: DashMap<String, Vec<f32>>,
    order: parking_lot::Mutex<VecDeque<String>>,
}

impl<P: EmbeddingProvider> CachingEmbedder<P> {
    /// Wrap `inner` with an embedding cache.
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            order: parking_lot::Mutex::new(VecDeque::new()),
        }
    }

    /// Compute (or recall) the embedding for `text`.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let key = hash_key(text);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let embedding = self.inner.embed(text).await;
        self.insert(key, embedding.clone());
        embedding
    }

    fn insert(&self, key: String, embedding: Vec<f32>) {
        self.cache.insert(key.clone(), embedding);
        let mut order = self.order.lock();
        order.push_back(key);
        while order.len() > MAX_EMBEDDING_CACHE_ENTRIES {
            if let Some(oldest) = order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
    }
}

fn hash_key(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_embedding_is_deterministic() {
        assert_eq!(local_embedding("hello"), local_embedding("hello"));
        assert_ne!(local_embedding("hello"), local_embedding("world"));
    }

    #[test]
    fn local_embedding_has_the_configured_dimension() {
        assert_eq!(local_embedding("anything").len(), LOCAL_EMBEDDING_DIM);
    }

    #[test]
    fn identical_text_has_cosine_similarity_one() {
        let v = local_embedding("identical prompt");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_never_matches() {
        let zero = vec![0.0f32; LOCAL_EMBEDDING_DIM];
        let v = local_embedding("something");
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
    }

    #[tokio::test]
    async fn caching_embedder_reuses_prior_computation() {
        let embedder = CachingEmbedder::new(LocalEmbeddingProvider);
        let first = embedder.embed("same text").await;
        let second = embedder.embed("same text").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn caching_embedder_evicts_oldest_past_capacity() {
        let embedder = CachingEmbedder::new(LocalEmbeddingProvider);
        for i in 0..(MAX_EMBEDDING_CACHE_ENTRIES + 10) {
            embedder.embed(&format!("text-{i}")).await;
        }
        assert!(embedder.cache.len() <= MAX_EMBEDDING_CACHE_ENTRIES);
    }
}
