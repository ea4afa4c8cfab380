//! Typed failover across a circuit-breaker-guarded primary and an ordered
//! list of alternative providers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use relaycore_core::{ProviderId, RelayError};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::observer::{CircuitBreakerEvent, CircuitBreakerObserver, NoopObserver};

/// One candidate in a failover chain.
#[derive(Debug, Clone)]
pub struct FailoverCandidate {
    /// The candidate provider.
    pub provider_id: ProviderId,
    /// Lower values are tried first.
    pub priority: u32,
    /// `[0, 1]`; higher is healthier. Used as the tie-breaker within a
    /// priority tier.
    pub health_score: f64,
    /// Whether this candidate should be considered at all right now.
    pub available: bool,
}

/// Order failover candidates the way `executeWithFailover` requires:
/// available only, ascending priority, then descending health score.
#[must_use]
pub fn ordered_candidates(mut candidates: Vec<FailoverCandidate>) -> Vec<FailoverCandidate> {
    candidates.retain(|candidate| candidate.available);
    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.health_score.partial_cmp(&a.health_score).unwrap_or(std::cmp::Ordering::Equal))
    });
    candidates
}

/// Try `primary_op` against `primary`; on failure, walk `candidates` in
/// failover order invoking `op` for each until one succeeds or all are
/// exhausted.
///
/// # Errors
/// Returns [`RelayError::AllProvidersFailed`] naming every provider
/// attempted if the primary and every candidate fail.
pub async fn execute_with_failover<F, Fut, T>(
    primary: &ProviderId,
    primary_op: impl FnOnce() -> Fut,
    candidates: Vec<FailoverCandidate>,
    observer: &dyn CircuitBreakerObserver,
    mut op: F,
) -> Result<T, RelayError>
where
    F: FnMut(&ProviderId) -> Fut,
    Fut: Future<Output = Result<T, RelayError>>,
{
    let mut attempted = vec![primary.clone()];
    if let Ok(value) = primary_op().await {
        return Ok(value);
    }

    for candidate in ordered_candidates(candidates) {
        attempted.push(candidate.provider_id.clone());
        match op(&candidate.provider_id).await {
            Ok(value) => {
                observer.on_event(CircuitBreakerEvent::FailoverSuccess {
                    provider: candidate.provider_id,
                });
                return Ok(value);
            }
            Err(_) => {
                observer.on_event(CircuitBreakerEvent::FailoverFailed {
                    provider: candidate.provider_id,
                });
            }
        }
    }

    observer.on_event(CircuitBreakerEvent::AllProvidersFailed {
        attempted: attempted.clone(),
    });
    Err(RelayError::all_providers_failed(attempted))
}

/// Owns one [`CircuitBreaker`] per provider, constructing them lazily on
/// first use with a shared configuration.
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: parking_lot::RwLock<HashMap<ProviderId, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    /// Construct a manager that builds each provider's breaker from
    /// `config` the first time it is requested.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Fetch (or lazily create) the breaker for `provider`.
    #[must_use]
    pub fn breaker_for(&self, provider: &ProviderId) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(provider) {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(
            breakers
                .entry(provider.clone())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(provider.clone(), self.config))),
        )
    }

    /// Snapshot every known provider's health, for use as the
    /// `isAvailable`/`healthScore` input to [`ordered_candidates`].
    #[must_use]
    pub fn health_snapshot(&self) -> Vec<(ProviderId, bool)> {
        self.breakers
            .read()
            .values()
            .map(|breaker| (breaker.provider().clone(), breaker.is_healthy()))
            .collect()
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// An observer used when the caller has none to supply.
#[must_use]
pub fn noop_observer() -> NoopObserver {
    NoopObserver
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name).unwrap()
    }

    #[test]
    fn ordered_candidates_sorts_by_priority_then_health() {
        let candidates = vec![
            FailoverCandidate {
                provider_id: provider("low-priority"),
                priority: 2,
                health_score: 0.99,
                available: true,
            },
            FailoverCandidate {
                provider_id: provider("unavailable"),
                priority: 0,
                health_score: 1.0,
                available: false,
            },
            FailoverCandidate {
                provider_id: provider("anthropic"),
                priority: 1,
                health_score: 0.9,
                available: true,
            },
            FailoverCandidate {
                provider_id: provider("neuroweaver"),
                priority: 1,
                health_score: 0.95,
                available: true,
            },
        ];
        let ordered = ordered_candidates(candidates);
        let names: Vec<_> = ordered.iter().map(|c| c.provider_id.as_str()).collect();
        assert_eq!(names, vec!["neuroweaver", "anthropic", "low-priority"]);
    }

    #[tokio::test]
    async fn scenario_three_failover_succeeds_on_second_candidate() {
        let anthropic = provider("anthropic");
        let neuroweaver = provider("neuroweaver");
        let candidates = vec![
            FailoverCandidate {
                provider_id: anthropic.clone(),
                priority: 1,
                health_score: 0.9,
                available: true,
            },
            FailoverCandidate {
                provider_id: neuroweaver.clone(),
                priority: 2,
                health_score: 0.8,
                available: true,
            },
        ];
        let observer = NoopObserver;
        let openai = provider("openai");
        let result = execute_with_failover(
            &openai,
            || async { Err(RelayError::queue_full("primary open")) },
            candidates,
            &observer,
            |candidate| {
                let candidate = candidate.clone();
                async move {
                    if candidate == anthropic {
                        Err(RelayError::queue_full("anthropic down"))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn all_providers_failed_when_every_candidate_errors() {
        let observer = NoopObserver;
        let openai = provider("openai");
        let candidates = vec![FailoverCandidate {
            provider_id: provider("anthropic"),
            priority: 1,
            health_score: 0.9,
            available: true,
        }];
        let result: Result<i32, RelayError> = execute_with_failover(
            &openai,
            || async { Err(RelayError::queue_full("primary down")) },
            candidates,
            &observer,
            |_candidate| async { Err(RelayError::queue_full("down")) },
        )
        .await;
        assert!(matches!(result, Err(RelayError::AllProvidersFailed { .. })));
    }
}
