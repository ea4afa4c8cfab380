//! # RelayCore Config
//!
//! Typed, validated configuration for every subsystem, loaded from a TOML
//! file with environment variable overrides. Nothing in this crate panics
//! on a malformed document — a bad file becomes
//! [`relaycore_core::RelayError::InvalidConfig`] at load time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod env_overlay;

use std::path::Path;

use relaycore_core::RelayError;
use serde::{Deserialize, Serialize};

pub use env_overlay::apply_env_overrides;
pub use relaycore_telemetry::TelemetryConfig;

/// Queue dispatch strategy: which of the four selection strategies the
/// priority queue uses to pick the next provider with capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStrategy {
    /// Strict descending-priority scan.
    Priority,
    /// Round-robin among providers with capacity.
    RoundRobin,
    /// Pick the provider with the fewest active requests.
    LeastLoaded,
    /// Weighted score of priority, load, and wait time.
    Adaptive,
}

/// Which embedding source the semantic cache should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Call an external embeddings API.
    External,
    /// Use the deterministic SHA-256-derived fallback.
    Local,
}

/// Steering engine configuration: the cost guardrails applied before a
/// matched rule's action is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Path to the declarative rule file.
    pub rules_file: String,
    /// Daily spend ceiling across the whole deployment, in USD.
    pub daily_budget_usd: f64,
    /// Per-request cost ceiling, in USD.
    pub per_request_max_usd: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            rules_file: "config/steering_rules.yaml".to_string(),
            daily_budget_usd: 1000.0,
            per_request_max_usd: 5.0,
        }
    }
}

/// Priority queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of requests that may sit in the queue at once.
    pub max_size: usize,
    /// Per-provider concurrency limit.
    pub concurrency: std::collections::BTreeMap<String, usize>,
    /// Which selection strategy the poller uses.
    pub strategy: QueueStrategy,
    /// Default per-request timeout, in milliseconds.
    pub timeout_ms: u64,
    /// Base retry delay, in milliseconds (doubled per attempt).
    pub retry_delay_ms: u64,
    /// Maximum retry attempts per request.
    pub max_retries: u32,
    /// Whether to collect the queue's observability counters.
    pub enable_metrics: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            concurrency: std::collections::BTreeMap::new(),
            strategy: QueueStrategy::Priority,
            timeout_ms: 30_000,
            retry_delay_ms: 500,
            max_retries: 3,
            enable_metrics: true,
        }
    }
}

/// Circuit breaker configuration, shared by every provider's breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before tripping open.
    pub failure_threshold: u32,
    /// Time to wait before probing a half-open transition, in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Window over which failure/success counters are tallied, in
    /// milliseconds.
    pub monitoring_period_ms: u64,
    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
    /// Per-call timeout enforced by `execute`, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum retry attempts a caller of the breaker should perform.
    pub max_retries: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            monitoring_period_ms: 60_000,
            success_threshold: 2,
            timeout_ms: 10_000,
            max_retries: 3,
        }
    }
}

/// Two-tier key/value cache manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default TTL applied to entries written without an explicit TTL, in
    /// seconds.
    pub ttl_seconds: u64,
    /// Maximum number of entries kept in the local tier.
    pub max_local_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_local_entries: 10_000,
        }
    }
}

/// Semantic cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticCacheConfig {
    /// Whether the semantic cache is consulted at all.
    pub enabled: bool,
    /// Minimum cosine similarity for a lookup to count as a hit.
    pub similarity_threshold: f64,
    /// Maximum entries kept per `(provider, model)` bucket.
    pub max_cache_size: usize,
    /// Entry TTL, in seconds.
    pub ttl_seconds: u64,
    /// Which embedding source to use.
    pub embedding_provider: EmbeddingProviderKind,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.85,
            max_cache_size: 500,
            ttl_seconds: 3600,
            embedding_provider: EmbeddingProviderKind::Local,
        }
    }
}

/// Budget subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// How long a `BudgetStatusInfo` cache entry may be served before a
    /// synchronous recompute, in seconds.
    pub status_cache_ttl_sec: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            status_cache_ttl_sec: 300,
        }
    }
}

/// Outbound HTTP endpoints for the collaborators `relaycore-integrations`
/// adapts to. Any entry left blank means "no remote configured" and the
/// pipeline assembler falls back to a no-op/local-only implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Base URL of the NeuroWeaver tuning service, e.g.
    /// `https://neuroweaver.internal`.
    pub neuroweaver_base_url: String,
    /// Base URL of an external embeddings API, consulted when
    /// `semantic_cache.embedding_provider` is `external`.
    pub embeddings_base_url: String,
    /// Base URL of a remote KV service backing the cache manager's
    /// distributed tier.
    pub distributed_kv_base_url: String,
    /// Per-provider upstream call endpoints, keyed by provider id.
    pub provider_endpoints: std::collections::BTreeMap<String, ProviderEndpointConfig>,
    /// HTTP request timeout applied to every outbound call, in
    /// milliseconds.
    pub http_timeout_ms: u64,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            neuroweaver_base_url: String::new(),
            embeddings_base_url: String::new(),
            distributed_kv_base_url: String::new(),
            provider_endpoints: std::collections::BTreeMap::new(),
            http_timeout_ms: 10_000,
        }
    }
}

/// One upstream provider's call endpoint and credential.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderEndpointConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token used to authenticate outbound calls.
    pub api_key: String,
}

/// The complete, validated configuration tree for one RelayCore instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Steering engine options.
    pub steering: SteeringConfig,
    /// Priority queue options.
    pub queue: QueueConfig,
    /// Circuit breaker options.
    pub circuit: CircuitConfig,
    /// Key/value cache manager options.
    pub cache: CacheConfig,
    /// Semantic cache options.
    pub semantic_cache: SemanticCacheConfig,
    /// Budget subsystem options.
    pub budget: BudgetConfig,
    /// Structured logging options.
    pub telemetry: TelemetryConfig,
    /// Outbound HTTP integration endpoints.
    pub integrations: IntegrationsConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file at `path`, then apply any
    /// `RELAYCORE_*` environment variable overrides.
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidConfig`] if the file cannot be read or
    /// does not parse, or if the resulting tree fails [`Self::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            RelayError::invalid_config(format!("cannot read config file {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML document string, then apply
    /// environment overrides and validate.
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidConfig`] on a parse or validation
    /// failure.
    pub fn from_toml_str(raw: &str) -> Result<Self, RelayError> {
        let mut config: Self = toml::from_str(raw)
            .map_err(|err| RelayError::invalid_config(format!("invalid config TOML: {err}")))?;
        apply_env_overrides(&mut config, std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants that serde's defaults cannot
    /// express on their own.
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidConfig`] describing the first
    /// violation found.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.queue.max_size == 0 {
            return Err(RelayError::invalid_config("queue.max_size must be > 0"));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(RelayError::invalid_config(
                "circuit.failureThreshold must be > 0",
            ));
        }
        if self.circuit.success_threshold == 0 {
            return Err(RelayError::invalid_config(
                "circuit.successThreshold must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.semantic_cache.similarity_threshold) {
            return Err(RelayError::invalid_config(
                "semanticCache.similarityThreshold must be within [0, 1]",
            ));
        }
        if self.steering.daily_budget_usd < 0.0 || self.steering.per_request_max_usd < 0.0 {
            return Err(RelayError::invalid_config(
                "steering budgets must be non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RelayConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_document_falls_back_to_defaults() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config.queue.max_size, 1000);
        assert_eq!(config.circuit.failure_threshold, 5);
    }

    #[test]
    fn rejects_zero_queue_size() {
        let raw = "[queue]\nmax_size = 0\n";
        let err = RelayConfig::from_toml_str(raw).unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn rejects_out_of_range_similarity_threshold() {
        let raw = "[semantic_cache]\nsimilarity_threshold = 1.5\n";
        let err = RelayConfig::from_toml_str(raw).unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = RelayConfig::load("/nonexistent/path/relaycore.toml").unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }
}
