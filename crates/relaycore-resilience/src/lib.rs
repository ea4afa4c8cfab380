//! # RelayCore Resilience
//!
//! Circuit breakers with typed failover, and the priority request queue —
//! grouped together because both are concurrency-control primitives
//! guarding calls to upstream providers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod failover;
pub mod observer;
pub mod queue;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use failover::{execute_with_failover, CircuitBreakerManager, FailoverCandidate};
pub use observer::{CircuitBreakerEvent, CircuitBreakerObserver, NoopObserver, QueueEvent, QueueObserver};
pub use queue::{Priority, PriorityQueue, PriorityQueueConfig, ProviderExecutor, QueueStats, QueueWorkerHandle};
pub use retry::RetryConfig;
