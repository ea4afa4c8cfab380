//! Narrow observer traits for circuit breaker and queue events — a small,
//! closed set of typed events rather than a dynamic pub/sub bus, per the
//! recorded design adaptation.

use relaycore_core::ProviderId;

/// Events a [`crate::circuit_breaker::CircuitBreaker`] or the failover
/// manager emits.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker tripped open.
    Opened {
        /// The guarded provider.
        provider: ProviderId,
    },
    /// The breaker began probing after its recovery timeout elapsed.
    HalfOpened {
        /// The guarded provider.
        provider: ProviderId,
    },
    /// The breaker closed after enough consecutive probe successes.
    Closed {
        /// The guarded provider.
        provider: ProviderId,
    },
    /// A failover candidate failed and the manager is moving to the next
    /// one.
    FailoverFailed {
        /// The candidate that failed.
        provider: ProviderId,
    },
    /// A failover candidate succeeded.
    FailoverSuccess {
        /// The candidate that succeeded.
        provider: ProviderId,
    },
    /// The primary and every failover candidate failed.
    AllProvidersFailed {
        /// Every provider attempted, in attempt order.
        attempted: Vec<ProviderId>,
    },
}

/// Receives [`CircuitBreakerEvent`]s. The default no-op implementation
/// means most callers never need to implement this at all.
pub trait CircuitBreakerObserver: Send + Sync {
    /// Called synchronously whenever the breaker or failover manager
    /// raises an event.
    fn on_event(&self, event: CircuitBreakerEvent);
}

/// An observer that discards every event.
pub struct NoopObserver;

impl CircuitBreakerObserver for NoopObserver {
    fn on_event(&self, _event: CircuitBreakerEvent) {}
}

/// Events the priority queue emits over one request's lifetime.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A request was accepted into the queue.
    RequestQueued {
        /// The request's id.
        request_id: String,
    },
    /// A request was selected and handed to a provider call.
    RequestProcessing {
        /// The request's id.
        request_id: String,
    },
    /// A request completed successfully.
    RequestCompleted {
        /// The request's id.
        request_id: String,
        /// Total time spent waiting plus executing, in milliseconds.
        wait_ms: f64,
    },
    /// A request failed and was rescheduled for retry.
    RequestRetried {
        /// The request's id.
        request_id: String,
        /// The retry attempt number about to be made.
        attempt: u32,
    },
}

/// Receives [`QueueEvent`]s.
pub trait QueueObserver: Send + Sync {
    /// Called synchronously whenever the queue raises an event.
    fn on_event(&self, event: QueueEvent);
}

impl QueueObserver for NoopObserver {
    fn on_event(&self, _event: QueueEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_accepts_every_event_variant() {
        let observer = NoopObserver;
        CircuitBreakerObserver::on_event(
            &observer,
            CircuitBreakerEvent::Opened {
                provider: ProviderId::new("openai").unwrap(),
            },
        );
        QueueObserver::on_event(
            &observer,
            QueueEvent::RequestQueued {
                request_id: "r1".into(),
            },
        );
    }
}
