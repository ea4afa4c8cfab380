//! The upstream-provider call boundary: the core treats every provider as
//! an opaque `providerCall(provider, payload) -> response`, observing only
//! latency, errors, and a caller-supplied cost.

use async_trait::async_trait;
use relaycore_core::{ProviderId, RelayError, RelayResult};
use serde_json::Value;

/// Performs the actual HTTP call to an upstream provider. Implemented here
/// rather than in `relaycore-resilience` so the circuit breaker/failover
/// layer never depends on an HTTP client directly — it only sees
/// `relaycore_resilience::ProviderExecutor`, which `relaycore-pipeline`
/// implements by delegating to this trait.
#[async_trait]
pub trait ProviderCall: Send + Sync {
    /// Send `payload` to `provider` and return its raw JSON response.
    async fn call(&self, provider: &ProviderId, payload: &Value) -> RelayResult<Value>;
}

/// Maps a [`ProviderId`] to the base URL and bearer token used to reach it.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    /// Provider this endpoint serves.
    pub provider_id: ProviderId,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token sent as `Authorization: Bearer <token>`.
    pub api_key: String,
}

/// A generic JSON-over-HTTP [`ProviderCall`] implementation: POSTs
/// `payload` to the configured endpoint's `/chat/completions` path with a
/// bearer token. Provider-specific request/response shaping is the
/// pipeline's job; this type only moves bytes.
pub struct HttpProviderCaller {
    http: reqwest::Client,
    endpoints: std::collections::HashMap<ProviderId, ProviderEndpoint>,
}

impl HttpProviderCaller {
    /// Construct a caller over the given set of provider endpoints.
    #[must_use]
    pub fn new(endpoints: Vec<ProviderEndpoint>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints: endpoints.into_iter().map(|e| (e.provider_id.clone(), e)).collect(),
        }
    }
}

#[async_trait]
impl ProviderCall for HttpProviderCaller {
    async fn call(&self, provider: &ProviderId, payload: &Value) -> RelayResult<Value> {
        let endpoint = self
            .endpoints
            .get(provider)
            .ok_or_else(|| RelayError::invalid_config(format!("no endpoint configured for provider {provider}")))?;

        let response = self
            .http
            .post(format!("{}/chat/completions", endpoint.base_url))
            .bearer_auth(&endpoint.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| RelayError::provider_failure(provider.clone(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::provider_failure(
                provider.clone(),
                format!("upstream returned status {}", response.status()),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| RelayError::provider_failure(provider.clone(), format!("invalid response body: {err}")))
    }
}
