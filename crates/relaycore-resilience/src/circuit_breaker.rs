//! Per-provider circuit breaker: `CLOSED -> OPEN -> HALF_OPEN -> CLOSED`,
//! with windowed failure counters and a timeout-wrapped execution helper.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use relaycore_core::{ProviderId, RelayError};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::observer::{CircuitBreakerEvent, CircuitBreakerObserver, NoopObserver};

/// The three states a breaker can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed = 0,
    /// Calls are rejected immediately.
    Open = 1,
    /// A limited number of probe calls are allowed through.
    HalfOpen = 2,
}

impl CircuitState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Tunables for one breaker, shared by every provider unless overridden.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before tripping `OPEN`.
    pub failure_threshold: u32,
    /// Time spent `OPEN` before probing `HALF_OPEN`.
    pub recovery_timeout: Duration,
    /// Window over which failure/success counters are tallied.
    pub monitoring_period: Duration,
    /// Consecutive `HALF_OPEN` successes required to close.
    pub success_threshold: u32,
    /// Per-call timeout enforced by [`CircuitBreaker::execute`].
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            monitoring_period: Duration::from_secs(60),
            success_threshold: 2,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A point-in-time readout of one breaker's counters.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStats {
    /// Current state.
    pub state: CircuitState,
    /// Lifetime failure count since the last transition to `CLOSED`.
    pub failure_count: u32,
    /// Successes observed in the current `HALF_OPEN` probe window.
    pub success_count: u32,
    /// Failures observed within the current monitoring period.
    pub failures_in_period: u64,
    /// Requests observed within the current monitoring period.
    pub requests_in_period: u64,
}

impl CircuitBreakerStats {
    /// Failure rate within the current monitoring period, `0.0` when no
    /// requests have been observed yet.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.requests_in_period == 0 {
            0.0
        } else {
            self.failures_in_period as f64 / self.requests_in_period as f64
        }
    }
}

/// One provider's circuit breaker.
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    failures_in_period: AtomicU64,
    requests_in_period: AtomicU64,
    period_started_at: Mutex<Instant>,
    opened_at: Mutex<Option<Instant>>,
    transition_lock: Mutex<()>,
    observer: Box<dyn CircuitBreakerObserver>,
}

impl CircuitBreaker {
    /// Construct a breaker with a no-op observer.
    #[must_use]
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig) -> Self {
        Self::with_observer(provider, config, Box::new(NoopObserver))
    }

    /// Construct a breaker that emits events to `observer`.
    #[must_use]
    pub fn with_observer(
        provider: ProviderId,
        config: CircuitBreakerConfig,
        observer: Box<dyn CircuitBreakerObserver>,
    ) -> Self {
        Self {
            provider,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            failures_in_period: AtomicU64::new(0),
            requests_in_period: AtomicU64::new(0),
            period_started_at: Mutex::new(Instant::now()),
            opened_at: Mutex::new(None),
            transition_lock: Mutex::new(()),
            observer,
        }
    }

    /// The provider this breaker guards.
    #[must_use]
    pub const fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// Current state, rolling the monitoring window and any overdue
    /// `OPEN -> HALF_OPEN` transition forward first.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.roll_period_if_due();
        self.maybe_transition_to_half_open();
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `true` when the breaker will currently accept a call.
    #[must_use]
    pub fn allows_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// `isHealthy()`: not `OPEN`, and the windowed failure rate is below
    /// 50% once at least one request has been observed in the window.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if self.state() == CircuitState::Open {
            return false;
        }
        let requests = self.requests_in_period.load(Ordering::Relaxed);
        if requests == 0 {
            return true;
        }
        let failures = self.failures_in_period.load(Ordering::Relaxed);
        (failures as f64 / requests as f64) < 0.5
    }

    /// Point-in-time stats snapshot.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failures_in_period: self.failures_in_period.load(Ordering::Relaxed),
            requests_in_period: self.requests_in_period.load(Ordering::Relaxed),
        }
    }

    /// Race `op` against the configured per-call timeout, recording the
    /// outcome against the breaker, rejecting up front if the breaker is
    /// `OPEN`.
    ///
    /// # Errors
    /// Returns [`RelayError::CircuitOpen`] if the breaker rejects the call,
    /// [`RelayError::ProviderTimeout`] if `op` does not complete within the
    /// configured timeout, or whatever error `op` itself returns.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, RelayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, RelayError>>,
    {
        if !self.allows_request() {
            return Err(RelayError::circuit_open(self.provider.clone()));
        }

        self.requests_in_period.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.config.timeout, op()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(RelayError::ProviderTimeout {
                    message: format!("provider {} timed out after {:?}", self.provider, self.config.timeout),
                    details: relaycore_core::error::ErrorDetails::none()
                        .with_attempted_providers(vec![self.provider.clone()]),
                })
            }
        }
    }

    /// Record a successful call, e.g. when `execute` is bypassed by a
    /// caller that measures success itself.
    pub fn record_success(&self) {
        self.roll_period_if_due();
        let _guard = self.transition_lock.lock();
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.roll_period_if_due();
        self.failures_in_period.fetch_add(1, Ordering::Relaxed);
        let _guard = self.transition_lock.lock();
        match self.state() {
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        *self.opened_at.lock() = Some(Instant::now());
        self.success_count.store(0, Ordering::Relaxed);
        warn!(provider = %self.provider, "circuit breaker opened");
        self.observer.on_event(CircuitBreakerEvent::Opened {
            provider: self.provider.clone(),
        });
    }

    fn transition_to_half_open(&self) {
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.success_count.store(0, Ordering::Relaxed);
        info!(provider = %self.provider, "circuit breaker half-open");
        self.observer.on_event(CircuitBreakerEvent::HalfOpened {
            provider: self.provider.clone(),
        });
    }

    fn transition_to_closed(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        *self.opened_at.lock() = None;
        info!(provider = %self.provider, "circuit breaker closed");
        self.observer.on_event(CircuitBreakerEvent::Closed {
            provider: self.provider.clone(),
        });
    }

    fn maybe_transition_to_half_open(&self) {
        if CircuitState::from_u8(self.state.load(Ordering::Acquire)) != CircuitState::Open {
            return;
        }
        let due = self
            .opened_at
            .lock()
            .is_some_and(|opened_at| opened_at.elapsed() >= self.config.recovery_timeout);
        if due {
            let _guard = self.transition_lock.lock();
            if CircuitState::from_u8(self.state.load(Ordering::Acquire)) == CircuitState::Open {
                self.transition_to_half_open();
            }
        }
    }

    fn roll_period_if_due(&self) {
        let mut started_at = self.period_started_at.lock();
        if started_at.elapsed() >= self.config.monitoring_period {
            self.failures_in_period.store(0, Ordering::Relaxed);
            self.requests_in_period.store(0, Ordering::Relaxed);
            *started_at = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderId {
        ProviderId::new("openai").unwrap()
    }

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(100),
            monitoring_period: Duration::from_secs(60),
            success_threshold: 2,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn opens_after_failure_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(provider(), fast_config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn recovers_to_closed_after_success_threshold_in_half_open() {
        let breaker = CircuitBreaker::new(provider(), fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().failure_count, 0);
    }

    #[tokio::test]
    async fn any_failure_in_half_open_reopens() {
        let breaker = CircuitBreaker::new(provider(), fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn execute_rejects_when_open() {
        let breaker = CircuitBreaker::new(provider(), fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        let result = breaker.execute(|| async { Ok::<_, RelayError>(1) }).await;
        assert!(matches!(result, Err(RelayError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn execute_times_out() {
        let mut config = fast_config();
        config.timeout = Duration::from_millis(20);
        let breaker = CircuitBreaker::new(provider(), config);
        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, RelayError>(1)
            })
            .await;
        assert!(matches!(result, Err(RelayError::ProviderTimeout { .. })));
    }
}
