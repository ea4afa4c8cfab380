//! Bridges the priority queue's generic [`ProviderExecutor`] trait to the
//! circuit breaker/failover layer and an HTTP [`ProviderCall`]. This is the
//! one piece of glue the resilience crate intentionally leaves to the
//! pipeline assembler rather than owning itself.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relaycore_core::{ProviderId, RelayResult};
use relaycore_integrations::ProviderCall;
use relaycore_resilience::{execute_with_failover, CircuitBreakerManager, CircuitBreakerObserver, FailoverCandidate, NoopObserver, ProviderExecutor};
use serde_json::Value;
use tokio::sync::oneshot;

/// What the priority queue dispatches: the outbound request body, the
/// ordered failover chain to try if the primary fails, and a slot for the
/// response payload (the queue's own completion channel only carries
/// success/failure, not a value).
pub struct QueuedCall {
    /// JSON body to send to the provider.
    pub request_payload: Value,
    /// Failover candidates to try, in the order [`execute_with_failover`]
    /// orders them, if the primary fails.
    pub candidates: Vec<FailoverCandidate>,
    response_tx: Mutex<Option<oneshot::Sender<Value>>>,
}

impl QueuedCall {
    /// Construct a call payload, returning it alongside the receiver the
    /// caller awaits for the eventual response body.
    #[must_use]
    pub fn new(request_payload: Value, candidates: Vec<FailoverCandidate>) -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request_payload,
                candidates,
                response_tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn complete(&self, response: Value) {
        if let Some(tx) = self.response_tx.lock().take() {
            let _ = tx.send(response);
        }
    }
}

/// Executes a dispatched [`QueuedCall`] by running the primary (breaker
/// guarded) attempt and, on failure, walking the failover chain — the
/// "`CircuitBreaker.execute(providerCall)` [failover chain]" stage of the
/// request pipeline.
pub struct ResilientExecutor<C> {
    breakers: Arc<CircuitBreakerManager>,
    caller: Arc<C>,
    observer: Arc<dyn CircuitBreakerObserver>,
}

impl<C: ProviderCall + Send + Sync + 'static> ResilientExecutor<C> {
    /// Construct an executor over `caller`, tracking one breaker per
    /// provider via `breakers`.
    #[must_use]
    pub fn new(breakers: Arc<CircuitBreakerManager>, caller: Arc<C>) -> Self {
        Self::with_observer(breakers, caller, Arc::new(NoopObserver))
    }

    /// Construct an executor that emits circuit-breaker/failover events to
    /// `observer`.
    #[must_use]
    pub fn with_observer(breakers: Arc<CircuitBreakerManager>, caller: Arc<C>, observer: Arc<dyn CircuitBreakerObserver>) -> Self {
        Self { breakers, caller, observer }
    }

    async fn call_provider(&self, provider: &ProviderId, payload: &Value) -> RelayResult<Value> {
        let breaker = self.breakers.breaker_for(provider);
        let caller = Arc::clone(&self.caller);
        let provider = provider.clone();
        breaker.execute(|| async move { caller.call(&provider, payload).await }).await
    }
}

#[async_trait]
impl<C: ProviderCall + Send + Sync + 'static> ProviderExecutor<QueuedCall> for ResilientExecutor<C> {
    async fn execute(&self, provider: &ProviderId, payload: &QueuedCall) -> RelayResult<()> {
        let response = execute_with_failover(
            provider,
            || self.call_provider(provider, &payload.request_payload),
            payload.candidates.clone(),
            self.observer.as_ref(),
            |candidate| self.call_provider(candidate, &payload.request_payload),
        )
        .await?;

        payload.complete(response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycore_core::RelayError;
    use relaycore_resilience::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyCaller {
        failures_before_success: AtomicUsize,
    }

    #[async_trait]
    impl ProviderCall for FlakyCaller {
        async fn call(&self, provider: &ProviderId, _payload: &Value) -> RelayResult<Value> {
            if self.failures_before_success.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(RelayError::provider_failure(provider.clone(), "simulated failure"));
            }
            Ok(serde_json::json!({ "provider": provider.to_string() }))
        }
    }

    #[tokio::test]
    async fn failover_reaches_a_healthy_candidate() {
        let breakers = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::default()));
        let caller = Arc::new(FlakyCaller { failures_before_success: AtomicUsize::new(1) });
        let executor = ResilientExecutor::new(breakers, caller);

        let primary = ProviderId::new("openai").unwrap();
        let fallback = ProviderId::new("anthropic").unwrap();
        let (call, rx) = QueuedCall::new(
            serde_json::json!({"prompt": "hi"}),
            vec![FailoverCandidate {
                provider_id: fallback.clone(),
                priority: 1,
                health_score: 1.0,
                available: true,
            }],
        );

        executor.execute(&primary, &call).await.unwrap();
        let response = rx.await.unwrap();
        assert_eq!(response["provider"], fallback.to_string());
    }
}
