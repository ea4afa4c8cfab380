//! The priority request queue: a single in-process queue of
//! [`QueuedRequest`] entries, a per-provider active-request count, and a
//! poller that dispatches according to a configurable selection strategy.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use relaycore_config::QueueStrategy;
use relaycore_core::{ProviderId, RelayError, RelayResult};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::observer::{NoopObserver, QueueEvent, QueueObserver};
use crate::retry::RetryConfig;

/// Dispatch priority. Lower numeric value dispatches first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Dispatched ahead of everything else.
    Critical = 1,
    /// High priority.
    High = 2,
    /// The default priority.
    Normal = 3,
    /// Low priority.
    Low = 4,
    /// Background work, dispatched only when nothing else is ready.
    Background = 5,
}

/// Per-request metadata carried alongside the payload.
#[derive(Debug, Clone)]
pub struct QueuedRequestMetadata {
    /// The user this request is attributed to, if known.
    pub user_id: Option<String>,
    /// When the request was accepted into the queue.
    pub enqueued_at: Instant,
    /// Per-request dispatch timeout.
    pub timeout: Duration,
    /// Attempts made so far.
    pub retry_count: u32,
    /// Maximum attempts allowed.
    pub max_retries: u32,
}

struct Entry<P> {
    id: String,
    priority: Priority,
    provider_id: ProviderId,
    payload: P,
    completion: oneshot::Sender<RelayResult<()>>,
    metadata: QueuedRequestMetadata,
}

/// Executes one dispatched request's provider call. Implemented by
/// whatever the pipeline assembler wires the queue to (typically the
/// circuit breaker/failover layer).
#[async_trait]
pub trait ProviderExecutor<P>: Send + Sync
where
    P: Send + 'static,
{
    /// Run `payload` against `provider`.
    async fn execute(&self, provider: &ProviderId, payload: &P) -> RelayResult<()>;
}

/// Observability counters exposed by [`PriorityQueue::stats`].
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Total requests ever accepted.
    pub total_queued: u64,
    /// Total requests that completed (success or final failure).
    pub total_processed: u64,
    /// Total requests that ended in a final failure.
    pub total_failed: u64,
    /// Exponential moving average of time spent waiting plus executing, in
    /// milliseconds.
    pub average_wait_time_ms: f64,
    /// Current queue depth per priority.
    pub queue_size_by_priority: HashMap<Priority, usize>,
    /// Current active request count per provider.
    pub active_by_provider: HashMap<ProviderId, usize>,
}

/// Configuration consumed by the queue itself (a narrowed view of
/// [`relaycore_config::QueueConfig`] plus the retry policy it implies).
#[derive(Debug, Clone)]
pub struct PriorityQueueConfig {
    /// Maximum entries the queue will hold at once.
    pub max_size: usize,
    /// Per-provider concurrency limits; a provider absent from the map has
    /// no configured limit and falls back to `default_concurrency`.
    pub concurrency: HashMap<ProviderId, usize>,
    /// Concurrency applied to a provider absent from `concurrency`.
    pub default_concurrency: usize,
    /// Selection strategy.
    pub strategy: QueueStrategy,
    /// Default per-request timeout applied when a caller does not specify
    /// one.
    pub default_timeout: Duration,
    /// Retry policy for failed dispatches.
    pub retry: RetryConfig,
}

impl Default for PriorityQueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            concurrency: HashMap::new(),
            default_concurrency: 10,
            strategy: QueueStrategy::Priority,
            default_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// The queue itself. Cheaply clonable via [`Arc`] for sharing with the
/// poller task the pipeline starts.
pub struct PriorityQueue<P>
where
    P: Send + 'static,
{
    config: PriorityQueueConfig,
    entries: Mutex<VecDeque<Entry<P>>>,
    active_by_provider: DashMap<ProviderId, usize>,
    last_used_by_provider: DashMap<ProviderId, Instant>,
    total_queued: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
    average_wait_ms_bits: AtomicU64,
    next_id: AtomicU64,
    observer: Box<dyn QueueObserver>,
}

impl<P> PriorityQueue<P>
where
    P: Send + 'static,
{
    /// Construct a queue with a no-op observer.
    #[must_use]
    pub fn new(config: PriorityQueueConfig) -> Self {
        Self::with_observer(config, Box::new(NoopObserver))
    }

    /// Construct a queue that emits events to `observer`.
    #[must_use]
    pub fn with_observer(config: PriorityQueueConfig, observer: Box<dyn QueueObserver>) -> Self {
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
            active_by_provider: DashMap::new(),
            last_used_by_provider: DashMap::new(),
            total_queued: AtomicU64::new(0),
            total_processed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            average_wait_ms_bits: AtomicU64::new(0.0f64.to_bits()),
            next_id: AtomicU64::new(0),
            observer,
        }
    }

    fn capacity_for(&self, provider: &ProviderId) -> usize {
        self.config
            .concurrency
            .get(provider)
            .copied()
            .unwrap_or(self.config.default_concurrency)
    }

    fn has_capacity(&self, provider: &ProviderId) -> bool {
        let active = self.active_by_provider.get(provider).map_or(0, |v| *v);
        active < self.capacity_for(provider)
    }

    /// Accept a request into the queue in descending-priority order.
    ///
    /// # Errors
    /// Returns [`RelayError::QueueFull`] if the queue is already at
    /// `max_size`.
    pub fn enqueue(
        &self,
        provider_id: ProviderId,
        payload: P,
        priority: Priority,
        timeout: Option<Duration>,
        max_retries: Option<u32>,
        user_id: Option<String>,
    ) -> RelayResult<oneshot::Receiver<RelayResult<()>>> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.config.max_size {
            return Err(RelayError::queue_full(format!(
                "queue at capacity ({})",
                self.config.max_size
            )));
        }

        let id = format!("qr-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let metadata = QueuedRequestMetadata {
            user_id,
            enqueued_at: Instant::now(),
            timeout: timeout.unwrap_or(self.config.default_timeout),
            retry_count: 0,
            max_retries: max_retries.unwrap_or(self.config.retry.max_retries),
        };
        let entry = Entry {
            id: id.clone(),
            priority,
            provider_id,
            payload,
            completion: tx,
            metadata,
        };

        let insert_at = entries
            .iter()
            .position(|existing| existing.priority > priority)
            .unwrap_or(entries.len());
        entries.insert(insert_at, entry);
        drop(entries);

        self.total_queued.fetch_add(1, Ordering::Relaxed);
        self.observer.on_event(QueueEvent::RequestQueued { request_id: id });
        Ok(rx)
    }

    /// Remove and return the next entry to dispatch under the configured
    /// strategy, among entries whose provider currently has spare
    /// capacity. Marks the provider active for the returned entry.
    fn select_next(&self) -> Option<Entry<P>> {
        let mut entries = self.entries.lock();
        let candidate_index = match self.config.strategy {
            QueueStrategy::Priority => entries
                .iter()
                .position(|entry| self.has_capacity(&entry.provider_id)),
            QueueStrategy::RoundRobin => self.select_round_robin(&entries),
            QueueStrategy::LeastLoaded => self.select_least_loaded(&entries),
            QueueStrategy::Adaptive => self.select_adaptive(&entries),
        }?;

        let entry = entries.remove(candidate_index)?;
        drop(entries);

        *self.active_by_provider.entry(entry.provider_id.clone()).or_insert(0) += 1;
        self.last_used_by_provider
            .insert(entry.provider_id.clone(), Instant::now());
        Some(entry)
    }

    fn select_round_robin(&self, entries: &VecDeque<Entry<P>>) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.has_capacity(&entry.provider_id))
            .min_by_key(|(_, entry)| self.last_used_by_provider.get(&entry.provider_id).map(|v| *v))
            .map(|(index, _)| index)
    }

    fn select_least_loaded(&self, entries: &VecDeque<Entry<P>>) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.has_capacity(&entry.provider_id))
            .min_by_key(|(_, entry)| {
                self.active_by_provider.get(&entry.provider_id).map_or(0, |v| *v)
            })
            .map(|(index, _)| index)
    }

    fn select_adaptive(&self, entries: &VecDeque<Entry<P>>) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.has_capacity(&entry.provider_id))
            .max_by(|(_, a), (_, b)| {
                self.adaptive_score(a)
                    .partial_cmp(&self.adaptive_score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(index, _)| index)
    }

    fn adaptive_score(&self, entry: &Entry<P>) -> f64 {
        let priority_score = (6.0 - entry.priority as u8 as f64) / 5.0;
        let capacity = self.capacity_for(&entry.provider_id).max(1) as f64;
        let active = self
            .active_by_provider
            .get(&entry.provider_id)
            .map_or(0, |v| *v) as f64;
        let load_score = 1.0 - (active / capacity);
        let age_ms = entry.metadata.enqueued_at.elapsed().as_millis() as f64;
        let wait_score = (age_ms / 10_000.0).min(1.0);
        0.5 * priority_score + 0.3 * load_score + 0.2 * wait_score
    }

    fn release_provider_slot(&self, provider: &ProviderId) {
        if let Some(mut count) = self.active_by_provider.get_mut(provider) {
            *count = count.saturating_sub(1);
        }
    }

    fn record_completion(&self, wait_ms: f64) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        let mut prev = f64::from_bits(self.average_wait_ms_bits.load(Ordering::Relaxed));
        loop {
            let updated = if prev == 0.0 { wait_ms } else { 0.8 * prev + 0.2 * wait_ms };
            match self.average_wait_ms_bits.compare_exchange_weak(
                prev.to_bits(),
                updated.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => prev = f64::from_bits(actual),
            }
        }
    }

    /// Point-in-time observability snapshot.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let entries = self.entries.lock();
        let mut queue_size_by_priority = HashMap::new();
        for entry in entries.iter() {
            *queue_size_by_priority.entry(entry.priority).or_insert(0) += 1;
        }
        let active_by_provider = self
            .active_by_provider
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        QueueStats {
            total_queued: self.total_queued.load(Ordering::Relaxed),
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            average_wait_time_ms: f64::from_bits(self.average_wait_ms_bits.load(Ordering::Relaxed)),
            queue_size_by_priority,
            active_by_provider,
        }
    }

    /// Current queue depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` when the queue holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Handle controlling a running poller task; dropping or calling
/// [`Self::stop`] ends the loop.
pub struct QueueWorkerHandle {
    shutdown: Arc<AtomicBool>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl QueueWorkerHandle {
    /// Signal the poller to stop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.join_handle.await;
    }
}

/// Start the 100ms poller for `queue`, dispatching ready entries to
/// `executor`. The returned handle must be kept alive (or `.stop()`ed) for
/// the poller to keep running — dropping the handle does not itself abort
/// the task, matching the explicit worker lifecycle this workspace uses
/// everywhere else.
pub fn start_poller<P>(
    queue: Arc<PriorityQueue<P>>,
    executor: Arc<dyn ProviderExecutor<P>>,
) -> QueueWorkerHandle
where
    P: Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let poller_shutdown = Arc::clone(&shutdown);

    let join_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            if poller_shutdown.load(Ordering::SeqCst) {
                break;
            }
            while let Some(entry) = queue.select_next() {
                let queue = Arc::clone(&queue);
                let executor = Arc::clone(&executor);
                tokio::spawn(dispatch_entry(queue, executor, entry));
            }
        }
    });

    QueueWorkerHandle {
        shutdown,
        join_handle,
    }
}

async fn dispatch_entry<P>(queue: Arc<PriorityQueue<P>>, executor: Arc<dyn ProviderExecutor<P>>, mut entry: Entry<P>)
where
    P: Send + 'static,
{
    queue.observer.on_event(QueueEvent::RequestProcessing {
        request_id: entry.id.clone(),
    });

    let result = tokio::time::timeout(entry.metadata.timeout, executor.execute(&entry.provider_id, &entry.payload))
        .await
        .unwrap_or_else(|_| {
            Err(RelayError::ProviderTimeout {
                message: format!("request {} timed out waiting on {}", entry.id, entry.provider_id),
                details: relaycore_core::error::ErrorDetails::none()
                    .with_attempted_providers(vec![entry.provider_id.clone()]),
            })
        });

    queue.release_provider_slot(&entry.provider_id);

    match result {
        Ok(()) => {
            let wait_ms = entry.metadata.enqueued_at.elapsed().as_secs_f64() * 1000.0;
            queue.record_completion(wait_ms);
            queue.observer.on_event(QueueEvent::RequestCompleted {
                request_id: entry.id.clone(),
                wait_ms,
            });
            let _ = entry.completion.send(Ok(()));
        }
        Err(err) if err.is_retryable() && entry.metadata.retry_count < entry.metadata.max_retries => {
            entry.metadata.retry_count += 1;
            let delay = queue.config.retry.delay_for_attempt(entry.metadata.retry_count);
            queue.observer.on_event(QueueEvent::RequestRetried {
                request_id: entry.id.clone(),
                attempt: entry.metadata.retry_count,
            });
            debug!(request_id = %entry.id, attempt = entry.metadata.retry_count, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
            let mut entries = queue.entries.lock();
            let insert_at = entries
                .iter()
                .position(|existing| existing.priority > entry.priority)
                .unwrap_or(entries.len());
            entries.insert(insert_at, entry);
        }
        Err(err) => {
            queue.total_failed.fetch_add(1, Ordering::Relaxed);
            queue.total_processed.fetch_add(1, Ordering::Relaxed);
            warn!(request_id = %entry.id, error = %err, "request failed permanently");
            let _ = entry.completion.send(Err(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name).unwrap()
    }

    #[test]
    fn enqueue_preserves_descending_priority_order() {
        let config = PriorityQueueConfig {
            default_concurrency: 10,
            ..PriorityQueueConfig::default()
        };
        let queue: PriorityQueue<()> = PriorityQueue::new(config);
        let openai = provider("openai");
        let _a = queue
            .enqueue(openai.clone(), (), Priority::Normal, None, None, None)
            .unwrap();
        let _b = queue
            .enqueue(openai.clone(), (), Priority::Critical, None, None, None)
            .unwrap();
        let _c = queue
            .enqueue(openai, (), Priority::High, None, None, None)
            .unwrap();

        let entries = queue.entries.lock();
        let priorities: Vec<_> = entries.iter().map(|e| e.priority).collect();
        assert_eq!(priorities, vec![Priority::Critical, Priority::High, Priority::Normal]);
    }

    #[test]
    fn enqueue_rejects_when_full() {
        let config = PriorityQueueConfig {
            max_size: 1,
            ..PriorityQueueConfig::default()
        };
        let queue: PriorityQueue<()> = PriorityQueue::new(config);
        let openai = provider("openai");
        assert!(queue
            .enqueue(openai.clone(), (), Priority::Normal, None, None, None)
            .is_ok());
        let err = queue
            .enqueue(openai, (), Priority::Normal, None, None, None)
            .unwrap_err();
        assert!(matches!(err, RelayError::QueueFull { .. }));
    }

    #[test]
    fn scenario_four_priority_strategy_dispatches_by_priority_first() {
        let config = PriorityQueueConfig {
            default_concurrency: 1,
            strategy: QueueStrategy::Priority,
            ..PriorityQueueConfig::default()
        };
        let queue: PriorityQueue<&'static str> = PriorityQueue::new(config);
        let openai = provider("openai");
        let _a = queue
            .enqueue(openai.clone(), "A", Priority::Normal, None, None, None)
            .unwrap();
        let _b = queue
            .enqueue(openai.clone(), "B", Priority::Critical, None, None, None)
            .unwrap();
        let _c = queue
            .enqueue(openai, "C", Priority::High, None, None, None)
            .unwrap();

        let first = queue.select_next().unwrap();
        assert_eq!(first.payload, "B");
        queue.release_provider_slot(&first.provider_id);
        let second = queue.select_next().unwrap();
        assert_eq!(second.payload, "C");
        queue.release_provider_slot(&second.provider_id);
        let third = queue.select_next().unwrap();
        assert_eq!(third.payload, "A");
    }

    #[test]
    fn least_loaded_picks_provider_with_fewest_active() {
        let config = PriorityQueueConfig {
            default_concurrency: 5,
            strategy: QueueStrategy::LeastLoaded,
            ..PriorityQueueConfig::default()
        };
        let queue: PriorityQueue<&'static str> = PriorityQueue::new(config);
        let busy = provider("busy");
        let idle = provider("idle");
        queue.active_by_provider.insert(busy.clone(), 3);
        let _a = queue
            .enqueue(busy, "busy-req", Priority::Normal, None, None, None)
            .unwrap();
        let _b = queue
            .enqueue(idle, "idle-req", Priority::Normal, None, None, None)
            .unwrap();
        let picked = queue.select_next().unwrap();
        assert_eq!(picked.payload, "idle-req");
    }
}
