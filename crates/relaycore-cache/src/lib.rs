//! # RelayCore Cache
//!
//! The embedding-similarity semantic response cache and the two-tier
//! key/value cache manager that fronts external distributed storage.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod embedding;
pub mod kv_cache;
pub mod semantic_cache;

pub use embedding::{cosine_similarity, local_embedding, CachingEmbedder, EmbeddingProvider, LocalEmbeddingProvider};
pub use kv_cache::{start_sweeper, CacheManager, CacheStats, DistributedKv, NoopDistributedKv, SweeperHandle};
pub use semantic_cache::{CachedSemanticEntry, SemanticCache, SemanticEntryMetadata};
