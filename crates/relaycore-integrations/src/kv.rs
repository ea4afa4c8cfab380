//! HTTP-backed `relaycore_cache::DistributedKv` adapter: GET/SET with TTL,
//! glob KEYS, and bulk DEL against a remote key/value service.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use relaycore_cache::DistributedKv;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct GetResponse {
    value: String,
    ttl_seconds: u64,
}

#[derive(Serialize)]
struct SetRequest<'a> {
    value: &'a str,
    ttl_seconds: u64,
}

#[derive(Deserialize)]
struct KeysResponse {
    keys: Vec<String>,
}

/// Talks to a remote KV service over HTTP. Values are base64-encoded on
/// the wire since the underlying store model is string GET/SET.
pub struct HttpDistributedKv {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDistributedKv {
    /// Construct an adapter pointed at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl DistributedKv for HttpDistributedKv {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Duration)>, String> {
        let url = format!("{}/kv/{key}", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|err| err.to_string())?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: GetResponse = response.json().await.map_err(|err| err.to_string())?;
        let value = base64::engine::general_purpose::STANDARD
            .decode(&body.value)
            .map_err(|err| err.to_string())?;
        Ok(Some((value, Duration::from_secs(body.ttl_seconds))))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), String> {
        let url = format!("{}/kv/{key}", self.base_url);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&value);
        self.http
            .put(&url)
            .json(&SetRequest {
                value: &encoded,
                ttl_seconds: ttl.as_secs(),
            })
            .send()
            .await
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<(), String> {
        let url = format!("{}/kv?pattern={pattern}", self.base_url);
        self.http.delete(&url).send().await.map_err(|err| err.to_string())?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, String> {
        let url = format!("{}/kv/keys", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|err| err.to_string())?;
        let body: KeysResponse = response.json().await.map_err(|err| err.to_string())?;
        Ok(body.keys)
    }
}
