//! RelayCore's top-level binary: loads configuration, installs tracing,
//! constructs every subsystem, and starts the pipeline's background
//! workers. Carries no transport of its own (no HTTP/WebSocket server) —
//! see the crate docs for why — so it demonstrates readiness by running
//! one representative request end to end before parking on a shutdown
//! signal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relaycore_budget::{
    BudgetIntegration, BudgetManager, BudgetRegistry, InMemoryStore as BudgetStore, NoOrganizationDirectory, UsageTracker,
};
use relaycore_cache::{CacheManager, EmbeddingProvider, LocalEmbeddingProvider, NoopDistributedKv, SemanticCache};
use relaycore_config::{EmbeddingProviderKind, RelayConfig};
use relaycore_core::request::AIRequestBuilder;
use relaycore_cost::CostPredictor;
use relaycore_integrations::{HttpDistributedKv, HttpEmbeddingProvider, HttpProviderCaller, NeuroWeaverClient, ProviderEndpoint};
use relaycore_pipeline::{CancellationToken, PipelineWorkers, RequestPipeline, ResilientExecutor};
use relaycore_resilience::{CircuitBreakerConfig, CircuitBreakerManager, PriorityQueue, PriorityQueueConfig, RetryConfig};
use relaycore_steering::SteeringEngine;
use tracing::info;

fn circuit_breaker_config(config: &relaycore_config::CircuitConfig) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: config.failure_threshold,
        recovery_timeout: Duration::from_millis(config.recovery_timeout_ms),
        monitoring_period: Duration::from_millis(config.monitoring_period_ms),
        success_threshold: config.success_threshold,
        timeout: Duration::from_millis(config.timeout_ms),
    }
}

fn priority_queue_config(config: &relaycore_config::QueueConfig) -> PriorityQueueConfig {
    PriorityQueueConfig {
        max_size: config.max_size,
        concurrency: config
            .concurrency
            .iter()
            .filter_map(|(provider, limit)| Some((relaycore_core::ProviderId::new(provider).ok()?, *limit)))
            .collect(),
        default_concurrency: 10,
        strategy: config.strategy,
        default_timeout: Duration::from_millis(config.timeout_ms),
        retry: RetryConfig {
            base_delay_ms: config.retry_delay_ms,
            max_delay_ms: config.retry_delay_ms.saturating_mul(16),
            max_retries: config.max_retries,
            jitter: true,
        },
    }
}

/// Either embedding source the semantic cache can be configured with,
/// picked once at startup from [`relaycore_config::SemanticCacheConfig`]
/// and fixed for the process's lifetime.
enum ConfiguredEmbeddingProvider {
    Local(LocalEmbeddingProvider),
    External(HttpEmbeddingProvider),
}

#[async_trait]
impl EmbeddingProvider for ConfiguredEmbeddingProvider {
    async fn embed(&self, text: &str) -> Vec<f32> {
        match self {
            Self::Local(provider) => provider.embed(text).await,
            Self::External(provider) => provider.embed(text).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/relaycore.toml".to_string());
    let config = match RelayConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config from {config_path}: {err}");
            RelayConfig::default()
        }
    };

    if let Err(err) = relaycore_telemetry::init_tracing(&config.telemetry) {
        eprintln!("failed to install tracing subscriber: {err}");
    }

    info!(config_path = %config_path, "starting relaycore");

    let steering = Arc::new(SteeringEngine::load(&config.steering.rules_file)?);

    let budget_store = Arc::new(BudgetStore::new());
    let budget_registry = Arc::new(BudgetRegistry::new(budget_store.clone()));
    let usage_tracker = Arc::new(UsageTracker::new(budget_store, Duration::from_secs(config.budget.status_cache_ttl_sec)));
    let cost_predictor = Arc::new(CostPredictor::new());
    let budget_manager = Arc::new(BudgetManager::new(budget_registry.clone(), usage_tracker.clone(), cost_predictor.clone()));
    let budget_integration = Arc::new(BudgetIntegration::new(budget_manager.clone(), budget_registry, Arc::new(NoOrganizationDirectory)));

    let embedding_provider = match config.semantic_cache.embedding_provider {
        EmbeddingProviderKind::Local => ConfiguredEmbeddingProvider::Local(LocalEmbeddingProvider),
        EmbeddingProviderKind::External => ConfiguredEmbeddingProvider::External(HttpEmbeddingProvider::new(&config.integrations.embeddings_base_url)),
    };
    let semantic_cache = Arc::new(SemanticCache::new(config.semantic_cache.clone(), embedding_provider));

    let distributed_kv: Arc<dyn relaycore_cache::DistributedKv> = if config.integrations.distributed_kv_base_url.is_empty() {
        Arc::new(NoopDistributedKv)
    } else {
        Arc::new(HttpDistributedKv::new(&config.integrations.distributed_kv_base_url))
    };
    let cache_manager = Arc::new(CacheManager::new(
        distributed_kv,
        Duration::from_secs(config.cache.ttl_seconds),
        config.cache.max_local_entries,
    ));

    let endpoints = config
        .integrations
        .provider_endpoints
        .iter()
        .filter_map(|(provider, endpoint)| {
            Some(ProviderEndpoint {
                provider_id: relaycore_core::ProviderId::new(provider).ok()?,
                base_url: endpoint.base_url.clone(),
                api_key: endpoint.api_key.clone(),
            })
        })
        .collect();
    let provider_caller = Arc::new(HttpProviderCaller::new(endpoints));

    let breakers = Arc::new(CircuitBreakerManager::new(circuit_breaker_config(&config.circuit)));
    let queue = Arc::new(PriorityQueue::new(priority_queue_config(&config.queue)));
    let executor: Arc<dyn relaycore_resilience::ProviderExecutor<relaycore_pipeline::QueuedCall>> =
        Arc::new(ResilientExecutor::new(Arc::clone(&breakers), provider_caller));

    let neuroweaver = (!config.integrations.neuroweaver_base_url.is_empty())
        .then(|| Arc::new(NeuroWeaverClient::new(&config.integrations.neuroweaver_base_url)));

    let pipeline = RequestPipeline::new(
        steering,
        budget_integration,
        budget_manager,
        cost_predictor,
        semantic_cache,
        Arc::clone(&queue),
        Arc::clone(&breakers),
        neuroweaver,
    );

    let workers = PipelineWorkers::start(queue, executor, usage_tracker, Some(cache_manager));

    let readiness_request = AIRequestBuilder::new()
        .system_source("relaycore-startup-check")
        .requested_model("gpt-3.5-turbo")
        .routing_profile_id("default")
        .prompt("ready")
        .build()?;
    let cancellation = CancellationToken::new();
    match pipeline.process(readiness_request, "default", &cancellation).await {
        Ok(response) => info!(provider = %response.provider_id, model = %response.model_id, "startup readiness check passed"),
        Err(err) => tracing::warn!(error = %err, "startup readiness check failed"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping workers");
    workers.stop().await;
    Ok(())
}
