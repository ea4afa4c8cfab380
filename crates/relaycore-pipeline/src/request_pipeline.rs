//! The assembled request pipeline: one `process` call runs a request
//! through every subsystem in the order fixed by the system overview —
//! steering, budget pre-flight, cost prediction/optimization, semantic
//! cache, dispatch through the priority queue and circuit breakers, cache
//! population, and usage recording.

use std::sync::Arc;

use relaycore_budget::{BudgetDecision, BudgetIntegration, BudgetManager, ScopeLink, ScopeType};
use relaycore_cache::{EmbeddingProvider, SemanticCache};
use relaycore_core::{AIRequest, ModelId, ProviderId, RelayError, RelayResult, ScopeId};
use relaycore_cost::CostPredictor;
use relaycore_integrations::{ModelSwitchRequest, NeuroWeaverClient, PerformanceFeedback, SwitchType};
use relaycore_resilience::{CircuitBreakerManager, FailoverCandidate, PriorityQueue};
use relaycore_steering::SteeringEngine;
use relaycore_telemetry::{PerformanceSnapshot, PerformanceTimer};
use serde_json::Value;
use tracing::instrument;

use crate::cancellation::CancellationToken;
use crate::executor::QueuedCall;
use crate::types::{priority_for, PipelineResponse};

/// Owns every subsystem and runs one request end to end. Cheap to clone
/// via the `Arc` fields it holds internally; construct one instance per
/// process and share it.
///
/// Generic only over the semantic cache's embedding provider: the
/// provider call itself is erased behind [`relaycore_resilience::ProviderExecutor`]
/// before it ever reaches this type, via the queue the pipeline dispatches
/// through.
pub struct RequestPipeline<E>
where
    E: EmbeddingProvider,
{
    steering: Arc<SteeringEngine>,
    budget_integration: Arc<BudgetIntegration>,
    budget_manager: Arc<BudgetManager>,
    cost_predictor: Arc<CostPredictor>,
    semantic_cache: Arc<SemanticCache<Value, E>>,
    queue: Arc<PriorityQueue<QueuedCall>>,
    breakers: Arc<CircuitBreakerManager>,
    neuroweaver: Option<Arc<NeuroWeaverClient>>,
}

impl<E> RequestPipeline<E>
where
    E: EmbeddingProvider,
{
    /// Assemble a pipeline over the given, already-constructed
    /// subsystems. `neuroweaver` is optional: pass `None` when no tuning
    /// service is configured.
    #[must_use]
    pub fn new(
        steering: Arc<SteeringEngine>,
        budget_integration: Arc<BudgetIntegration>,
        budget_manager: Arc<BudgetManager>,
        cost_predictor: Arc<CostPredictor>,
        semantic_cache: Arc<SemanticCache<Value, E>>,
        queue: Arc<PriorityQueue<QueuedCall>>,
        breakers: Arc<CircuitBreakerManager>,
        neuroweaver: Option<Arc<NeuroWeaverClient>>,
    ) -> Self {
        Self {
            steering,
            budget_integration,
            budget_manager,
            cost_predictor,
            semantic_cache,
            queue,
            breakers,
            neuroweaver,
        }
    }

    /// Run `request` through the full pipeline under `profile_id`,
    /// observing `cancellation` at every stage boundary.
    ///
    /// # Errors
    /// Returns [`RelayError::BudgetExceeded`] if a budget blocks the
    /// request, [`RelayError::Cancelled`] if `cancellation` fires first, or
    /// whatever error the queue/circuit-breaker/failover chain ultimately
    /// surfaces.
    #[instrument(skip(self, request, cancellation), fields(request_id = %request.id))]
    pub async fn process(&self, request: AIRequest, profile_id: &str, cancellation: &CancellationToken) -> RelayResult<PipelineResponse> {
        let mut timer = PerformanceTimer::start();
        cancellation.check("steering")?;

        let decision = self.steering.decide(&request, profile_id);
        let steering_ms = timer.mark();

        let scopes = request_scopes(&request);
        cancellation.check("budget check")?;
        if let Some(user_id) = &request.user_id {
            let team_scope = scopes.iter().find(|(t, _)| *t == ScopeType::Team).map(|(_, id)| id);
            let project_scope = scopes.iter().find(|(t, _)| *t == ScopeType::Project).map(|(_, id)| id);
            let check = self
                .budget_integration
                .check_request_constraints(user_id, team_scope, project_scope, decision.estimated_cost)
                .await?;
            if !check.can_proceed {
                return Err(RelayError::budget_exceeded(
                    "unknown",
                    check.reason.unwrap_or_else(|| "budget constraint violated".to_string()),
                    check.suggested_actions.iter().map(|a| format!("{a:?}")).collect(),
                ));
            }
        }
        let budget_check_ms = timer.mark();

        let mut scope_links: Vec<ScopeLink> = Vec::with_capacity(scopes.len() + 1);
        if let Some(user_id) = &request.user_id {
            scope_links.push(ScopeLink { scope_type: ScopeType::User, scope_id: ScopeId::from(user_id) });
        }
        scope_links.extend(scopes.iter().map(|(scope_type, scope_id)| ScopeLink { scope_type: *scope_type, scope_id: scope_id.clone() }));
        cancellation.check("cost prediction")?;
        let model_id = match self.budget_manager.allocate_budget(&request, &scope_links).await? {
            BudgetDecision::Proceed => decision.model_id.clone(),
            BudgetDecision::Downgrade { target_hint } => {
                ModelId::new(target_hint).unwrap_or_else(|_| decision.model_id.clone())
            }
            BudgetDecision::Reject { reason, suggested_actions } => {
                return Err(RelayError::budget_exceeded(
                    "unknown",
                    reason,
                    suggested_actions.iter().map(|a| format!("{a:?}")).collect(),
                ));
            }
        };
        let cost_ms = timer.mark();

        let prompt = request.effective_prompt();
        cancellation.check("cache lookup")?;
        if let Some(cached) = self.semantic_cache.lookup(decision.provider_id.as_str(), model_id.as_str(), &prompt).await {
            let cache_lookup_ms = timer.mark();
            return Ok(PipelineResponse {
                provider_id: decision.provider_id,
                model_id,
                payload: cached,
                cache_hit: true,
                estimated_cost: decision.estimated_cost,
                performance: PerformanceSnapshot {
                    steering_ms,
                    budget_check_ms,
                    cost_ms,
                    cache_lookup_ms,
                    queue_wait_ms: 0.0,
                    provider_call_ms: 0.0,
                    total_ms: timer.total_ms(),
                },
            });
        }
        let cache_lookup_ms = timer.mark();

        let candidates = decision
            .fallback_provider
            .as_ref()
            .map(|fallback| vec![fallback_candidate(fallback, &self.breakers)])
            .unwrap_or_default();
        let request_payload = serde_json::to_value(&request).map_err(|err| RelayError::internal("failed to serialize request", err))?;
        let (call, response_rx) = QueuedCall::new(request_payload, candidates);
        let priority = priority_for(request.cost_preference);

        cancellation.check("enqueue")?;
        let completion_rx = self.queue.enqueue(decision.provider_id.clone(), call, priority, None, None, request.user_id.as_ref().map(|u| u.as_str().to_string()))?;
        let completion = cancellation.race(async { completion_rx.await.map_err(|_| RelayError::internal("queue worker dropped the completion channel", anyhow::anyhow!("channel closed")) ) }).await??;
        let _: () = completion;
        let response = response_rx
            .await
            .map_err(|_| RelayError::internal("provider executor dropped the response channel", anyhow::anyhow!("channel closed")))?;
        let provider_call_ms = timer.mark();

        self.semantic_cache.store(decision.provider_id.as_str(), model_id.as_str(), &prompt, response.clone()).await;

        if let Some(user_id) = &request.user_id {
            let team_scope = scopes.iter().find(|(t, _)| *t == ScopeType::Team).map(|(_, id)| id);
            let project_scope = scopes.iter().find(|(t, _)| *t == ScopeType::Project).map(|(_, id)| id);
            self.budget_integration
                .record_request_usage(
                    user_id,
                    team_scope,
                    project_scope,
                    decision.estimated_cost,
                    "USD",
                    Some(model_id.as_str()),
                    Some(request.id.as_str()),
                )
                .await;
        }

        self.cost_predictor.update_model(model_id.as_str(), decision.estimated_cost, decision.estimated_cost, 0);

        if let Some(neuroweaver) = &self.neuroweaver {
            neuroweaver
                .report_performance(
                    model_id.as_str(),
                    &PerformanceFeedback {
                        accuracy: None,
                        latency_ms: provider_call_ms as u64,
                        throughput: None,
                        cost: decision.estimated_cost,
                    },
                )
                .await;
            if model_id.as_str() != decision.model_id.as_str() {
                neuroweaver
                    .request_model_switch(&ModelSwitchRequest {
                        current_model: decision.model_id.to_string(),
                        target_model: Some(model_id.to_string()),
                        reason: "budget-driven downgrade".to_string(),
                        switch_type: SwitchType::Immediate,
                    })
                    .await;
            }
        }

        Ok(PipelineResponse {
            provider_id: decision.provider_id,
            model_id,
            payload: response,
            cache_hit: false,
            estimated_cost: decision.estimated_cost,
            performance: PerformanceSnapshot {
                steering_ms,
                budget_check_ms,
                cost_ms,
                cache_lookup_ms,
                queue_wait_ms: 0.0,
                provider_call_ms,
                total_ms: timer.total_ms(),
            },
        })
    }
}

fn request_scopes(request: &AIRequest) -> Vec<(ScopeType, ScopeId)> {
    let mut scopes = Vec::new();
    if let Some(team_id) = &request.team_id {
        scopes.push((ScopeType::Team, ScopeId::from(team_id)));
    }
    if let Some(project_id) = &request.project_id {
        scopes.push((ScopeType::Project, ScopeId::from(project_id)));
    }
    scopes
}

fn fallback_candidate(provider: &ProviderId, breakers: &CircuitBreakerManager) -> FailoverCandidate {
    let healthy = breakers.breaker_for(provider).is_healthy();
    FailoverCandidate {
        provider_id: provider.clone(),
        priority: 1,
        health_score: if healthy { 1.0 } else { 0.0 },
        available: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relaycore_budget::{BudgetRegistry, InMemoryStore as BudgetStore, NoOrganizationDirectory, UsageTracker};
    use relaycore_cache::LocalEmbeddingProvider;
    use relaycore_config::SemanticCacheConfig;
    use relaycore_core::request::AIRequestBuilder;
    use relaycore_integrations::ProviderCall;
    use relaycore_resilience::queue::start_poller;
    use relaycore_resilience::{CircuitBreakerConfig, PriorityQueueConfig};

    struct EchoCaller;

    #[async_trait]
    impl ProviderCall for EchoCaller {
        async fn call(&self, provider: &ProviderId, payload: &Value) -> RelayResult<Value> {
            Ok(serde_json::json!({ "provider": provider.to_string(), "echo": payload }))
        }
    }

    fn pipeline() -> RequestPipeline<LocalEmbeddingProvider> {
        let store = Arc::new(BudgetStore::new());
        let registry = Arc::new(BudgetRegistry::new(store.clone()));
        let tracker = Arc::new(UsageTracker::new(store, std::time::Duration::from_secs(0)));
        let predictor = Arc::new(CostPredictor::new());
        let budget_manager = Arc::new(BudgetManager::new(registry.clone(), tracker, predictor.clone()));
        let budget_integration = Arc::new(BudgetIntegration::new(budget_manager.clone(), registry, Arc::new(NoOrganizationDirectory)));

        let rules_dir = tempfile::tempdir().unwrap();
        let rules_path = rules_dir.path().join("rules.yaml");
        std::fs::write(
            &rules_path,
            r"
routing_rules:
  - name: default
    priority: 0
    conditions: []
    action:
      provider: openai
      model: gpt-3.5-turbo
      cost_multiplier: 1.0
      max_latency_ms: 2000
cost_constraints:
  daily_budget: 1000.0
  per_request_max: 5.0
  emergency_threshold: 900.0
performance_thresholds:
  max_latency: 3000
  min_success_rate: 0.9
",
        )
        .unwrap();
        let steering = Arc::new(SteeringEngine::load(&rules_path).unwrap());

        let semantic_cache = Arc::new(SemanticCache::new(SemanticCacheConfig { enabled: false, ..SemanticCacheConfig::default() }, LocalEmbeddingProvider));
        let queue = Arc::new(PriorityQueue::new(PriorityQueueConfig::default()));
        let breakers = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::default()));
        let executor = Arc::new(crate::executor::ResilientExecutor::new(Arc::clone(&breakers), Arc::new(EchoCaller)));
        let _handle = start_poller(Arc::clone(&queue), executor);
        std::mem::forget(_handle);

        RequestPipeline::new(steering, budget_integration, budget_manager, predictor, semantic_cache, queue, breakers, None)
    }

    fn request() -> AIRequest {
        AIRequestBuilder::new()
            .system_source("test-harness")
            .requested_model("gpt-3.5-turbo")
            .routing_profile_id("default")
            .prompt("hello there")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_request_without_a_budget_completes() {
        let pipeline = pipeline();
        let cancellation = CancellationToken::new();
        let response = pipeline.process(request(), "default", &cancellation).await.unwrap();
        assert!(!response.cache_hit);
        assert_eq!(response.provider_id.as_str(), "openai");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_steering() {
        let pipeline = pipeline();
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = pipeline.process(request(), "default", &cancellation).await;
        assert!(matches!(result, Err(RelayError::Cancelled { .. })));
    }
}
