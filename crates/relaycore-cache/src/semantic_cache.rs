//! Embedding-similarity response cache: a per-`(provider, model)` bucket of
//! recent responses, matched by cosine similarity rather than key equality.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use relaycore_config::SemanticCacheConfig;

use crate::embedding::{cosine_similarity, CachingEmbedder, EmbeddingProvider};

/// Metadata carried alongside a cached response.
#[derive(Debug, Clone)]
pub struct SemanticEntryMetadata {
    /// The provider that served the original response.
    pub provider: String,
    /// The model that served the original response.
    pub model: String,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
    /// Number of times this entry has been returned on a hit.
    pub hit_count: u64,
    /// When this entry was last returned on a hit.
    pub last_accessed: DateTime<Utc>,
}

/// One cached response plus its embedding and metadata.
#[derive(Debug, Clone)]
pub struct CachedSemanticEntry<R> {
    /// Unique id.
    pub id: uuid::Uuid,
    /// The prompt embedding this entry was stored under.
    pub embedding: Vec<f32>,
    /// The cached response payload.
    pub response: R,
    /// Bookkeeping metadata.
    pub metadata: SemanticEntryMetadata,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct BucketKey {
    provider: String,
    model: String,
}

/// Two-tier embedding-similarity cache: an in-process bucketed LRU backed
/// by a pluggable embedding source. The distributed-store tier named in
/// the originating spec is handled by `relaycore-integrations`' remote KV
/// adapter layered in front of this cache by the pipeline, not by this
/// type itself.
pub struct SemanticCache<R, P: EmbeddingProvider> {
    config: SemanticCacheConfig,
    embedder: CachingEmbedder<P>,
    buckets: dashmap::DashMap<BucketKey, Arc<RwLock<Vec<CachedSemanticEntry<R>>>>>,
}

impl<R: Clone, P: EmbeddingProvider> SemanticCache<R, P> {
    /// Construct a cache using `embedding_provider` as its embedding
    /// source.
    #[must_use]
    pub fn new(config: SemanticCacheConfig, embedding_provider: P) -> Self {
        Self {
            config,
            embedder: CachingEmbedder::new(embedding_provider),
            buckets: dashmap::DashMap::new(),
        }
    }

    /// Look up a response for `prompt` in the `(provider, model)` bucket.
    /// Returns the single highest-similarity entry at or above the
    /// configured threshold, bumping its hit count and last-accessed time.
    pub async fn lookup(&self, provider: &str, model: &str, prompt: &str) -> Option<R> {
        if !self.config.enabled {
            return None;
        }
        let key = BucketKey {
            provider: provider.to_string(),
            model: model.to_string(),
        };
        let Some(bucket) = self.buckets.get(&key) else {
            return None;
        };
        let query_embedding = self.embedder.embed(prompt).await;

        let mut entries = bucket.write();
        let best = entries
            .iter_mut()
            .map(|entry| (cosine_similarity(&query_embedding, &entry.embedding), entry))
            .filter(|(similarity, _)| f64::from(*similarity) >= self.config.similarity_threshold)
            .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap());

        if let Some((_, entry)) = best {
            entry.metadata.hit_count += 1;
            entry.metadata.last_accessed = Utc::now();
            Some(entry.response.clone())
        } else {
            None
        }
    }

    /// Store `response` under the `(provider, model)` bucket for `prompt`,
    /// evicting the least-recently-accessed entry if the bucket would
    /// exceed `maxCacheSize`.
    pub async fn store(&self, provider: &str, model: &str, prompt: &str, response: R) {
        if !self.config.enabled {
            return;
        }
        let key = BucketKey {
            provider: provider.to_string(),
            model: model.to_string(),
        };
        let embedding = self.embedder.embed(prompt).await;
        let now = Utc::now();
        let entry = CachedSemanticEntry {
            id: uuid::Uuid::new_v4(),
            embedding,
            response,
            metadata: SemanticEntryMetadata {
                provider: provider.to_string(),
                model: model.to_string(),
                created_at: now,
                hit_count: 0,
                last_accessed: now,
            },
        };

        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone();
        let mut entries = bucket.write();
        entries.push(entry);
        if entries.len() > self.config.max_cache_size {
            entries.sort_by_key(|e| e.metadata.last_accessed);
            let overflow = entries.len() - self.config.max_cache_size;
            entries.drain(0..overflow);
        }
    }

    /// Number of entries currently held across every bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.read().len()).sum()
    }

    /// Whether the cache currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbeddingProvider;

    fn cache() -> SemanticCache<String, LocalEmbeddingProvider> {
        SemanticCache::new(SemanticCacheConfig::default(), LocalEmbeddingProvider)
    }

    #[tokio::test]
    async fn store_then_lookup_with_the_same_prompt_hits() {
        let cache = cache();
        cache.store("openai", "gpt-4", "what is the capital of france", "Paris".to_string()).await;
        let hit = cache.lookup("openai", "gpt-4", "what is the capital of france").await;
        assert_eq!(hit, Some("Paris".to_string()));
    }

    #[tokio::test]
    async fn lookup_in_a_different_bucket_misses() {
        let cache = cache();
        cache.store("openai", "gpt-4", "hello", "hi there".to_string()).await;
        let miss = cache.lookup("anthropic", "claude-3-opus", "hello").await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn lookup_bumps_hit_count() {
        let cache = cache();
        cache.store("openai", "gpt-4", "repeat prompt", "answer".to_string()).await;
        cache.lookup("openai", "gpt-4", "repeat prompt").await;
        cache.lookup("openai", "gpt-4", "repeat prompt").await;
        let key = BucketKey {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
        };
        let bucket = cache.buckets.get(&key).unwrap();
        assert_eq!(bucket.read()[0].metadata.hit_count, 2);
    }

    #[tokio::test]
    async fn disabled_cache_never_stores_or_hits() {
        let mut config = SemanticCacheConfig::default();
        config.enabled = false;
        let cache: SemanticCache<String, LocalEmbeddingProvider> = SemanticCache::new(config, LocalEmbeddingProvider);
        cache.store("openai", "gpt-4", "x", "y".to_string()).await;
        assert!(cache.lookup("openai", "gpt-4", "x").await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn bucket_overflow_drops_least_recently_accessed() {
        let mut config = SemanticCacheConfig::default();
        config.max_cache_size = 2;
        config.similarity_threshold = 1.1; // unreachable, forces distinct unmatched entries
        let cache: SemanticCache<String, LocalEmbeddingProvider> = SemanticCache::new(config, LocalEmbeddingProvider);
        cache.store("openai", "gpt-4", "a", "ra".to_string()).await;
        cache.store("openai", "gpt-4", "b", "rb".to_string()).await;
        cache.store("openai", "gpt-4", "c", "rc".to_string()).await;
        assert_eq!(cache.len(), 2);
    }
}
