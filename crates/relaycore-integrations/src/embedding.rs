//! External embeddings API adapter implementing
//! `relaycore_cache::EmbeddingProvider`. On any failure, falls back to the
//! deterministic local embedder so a flaky embeddings endpoint degrades the
//! semantic cache's hit rate rather than taking it down.

use async_trait::async_trait;
use relaycore_cache::{local_embedding, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Calls an external embeddings API over HTTP, falling back to the local
/// deterministic embedder on any failure.
pub struct HttpEmbeddingProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpEmbeddingProvider {
    /// Construct a provider pointed at `endpoint` (expected to accept
    /// `{"input": "..."}` and return `{"embedding": [...]}`).
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Vec<f32> {
        let result = async {
            let response = self.http.post(&self.endpoint).json(&EmbedRequest { input: text }).send().await?;
            response.json::<EmbedResponse>().await
        }
        .await;

        match result {
            Ok(body) => body.embedding,
            Err(err) => {
                warn!(error = %err, "embeddings API call failed, falling back to local embedder");
                local_embedding(text)
            }
        }
    }
}
