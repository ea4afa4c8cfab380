//! Background workers the pipeline depends on but does not start
//! implicitly: the queue poller, the budget status-cache sweeper, and the
//! distributed-cache sweeper. All three follow the same explicit
//! start/stop lifecycle as their owning crates — nothing here runs until
//! [`PipelineWorkers::start`] is called.

use std::sync::Arc;

use relaycore_budget::{start_status_sweeper, StatusSweeperHandle, UsageTracker};
use relaycore_cache::{start_sweeper, CacheManager, SweeperHandle};
use relaycore_resilience::queue::start_poller;
use relaycore_resilience::{PriorityQueue, ProviderExecutor, QueueWorkerHandle};

use crate::executor::QueuedCall;

/// Owns the handles to every background worker the pipeline needs running.
/// Constructed via [`Self::start`]; dropping it without calling
/// [`Self::stop`] leaves the workers running (the tasks are detached, not
/// tied to this handle's lifetime) — callers should always pair `start`
/// with a `stop` on shutdown.
pub struct PipelineWorkers {
    queue_poller: QueueWorkerHandle,
    status_sweeper: StatusSweeperHandle,
    cache_sweeper: Option<SweeperHandle>,
}

impl PipelineWorkers {
    /// Start the queue poller against `queue`/`executor`, the budget
    /// status-cache sweeper against `tracker`, and the distributed-cache
    /// sweeper against `cache_manager` if one is configured.
    pub fn start(
        queue: Arc<PriorityQueue<QueuedCall>>,
        executor: Arc<dyn ProviderExecutor<QueuedCall>>,
        tracker: Arc<UsageTracker>,
        cache_manager: Option<Arc<CacheManager>>,
    ) -> Self {
        Self {
            queue_poller: start_poller(queue, executor),
            status_sweeper: start_status_sweeper(tracker),
            cache_sweeper: cache_manager.map(start_sweeper),
        }
    }

    /// Stop every running worker, waiting for each to finish its current
    /// tick.
    pub async fn stop(self) {
        self.queue_poller.stop().await;
        self.status_sweeper.stop().await;
        if let Some(sweeper) = self.cache_sweeper {
            sweeper.stop().await;
        }
    }
}
