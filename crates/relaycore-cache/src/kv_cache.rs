//! Two-tier key/value cache: a process-local expiring map in front of an
//! external distributed store, with glob-pattern invalidation and a
//! background sweeper for expired local entries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use globset::Glob;
use tracing::warn;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The remote tier a [`CacheManager`] fronts. `relaycore-integrations`
/// supplies the real implementation (Redis or similar); tests use
/// [`NoopDistributedKv`].
#[async_trait]
pub trait DistributedKv: Send + Sync {
    /// Fetch a value, `Ok(None)` on a remote miss.
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Duration)>, String>;
    /// Store a value with the given TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), String>;
    /// Remove every key matching `pattern` (glob-style `* ? [set]`).
    async fn invalidate(&self, pattern: &str) -> Result<(), String>;
    /// List every key currently stored remotely, for glob invalidation and
    /// stats. Implementations backed by a store without native pattern
    /// matching can use this to filter client-side.
    async fn keys(&self) -> Result<Vec<String>, String>;
}

/// A [`DistributedKv`] that stores nothing and always misses. Used when no
/// remote tier is configured.
#[derive(Debug, Default)]
pub struct NoopDistributedKv;

#[async_trait]
impl DistributedKv for NoopDistributedKv {
    async fn get(&self, _key: &str) -> Result<Option<(Vec<u8>, Duration)>, String> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), String> {
        Ok(())
    }

    async fn invalidate(&self, _pattern: &str) -> Result<(), String> {
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, String> {
        Ok(Vec::new())
    }
}

/// Snapshot of cache effectiveness and local memory use.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Local-tier hits.
    pub hits: u64,
    /// Misses at both tiers.
    pub misses: u64,
    /// Entries currently held locally.
    pub keys: usize,
    /// Approximate bytes held in the local tier.
    pub memory_bytes: usize,
    /// How long this cache manager has been running.
    pub uptime: Duration,
}

struct LocalEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Two-tier cache manager: local expiring map in front of a
/// [`DistributedKv`] remote tier.
pub struct CacheManager {
    local: DashMap<String, LocalEntry>,
    remote: Arc<dyn DistributedKv>,
    default_ttl: Duration,
    max_local_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    started_at: Instant,
}

impl CacheManager {
    /// Construct a manager fronting `remote` with the given default TTL and
    /// local-entry cap.
    #[must_use]
    pub fn new(remote: Arc<dyn DistributedKv>, default_ttl: Duration, max_local_entries: usize) -> Self {
        Self {
            local: DashMap::new(),
            remote,
            default_ttl,
            max_local_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Read `key`: local first; on a local miss, fall through to the
    /// remote tier and populate local with the remote's TTL. Remote
    /// errors are treated as a remote miss rather than surfaced.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.local.get(key) {
            if entry.expires_at > Instant::now() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }
        self.local.remove(key);

        match self.remote.get(key).await {
            Ok(Some((value, ttl))) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.insert_local(key.to_string(), value.clone(), ttl);
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                warn!(%key, error = %err, "remote cache read failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write `value` for `key` to both tiers with the given TTL, or the
    /// manager's default if `ttl` is `None`.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.insert_local(key.to_string(), value.clone(), ttl);
        if let Err(err) = self.remote.set(key, value, ttl).await {
            warn!(%key, error = %err, "remote cache write failed");
        }
    }

    /// Evict every key matching `pattern` (glob syntax) from both tiers.
    /// An invalid pattern is logged and treated as matching nothing.
    pub async fn invalidate(&self, pattern: &str) {
        let Ok(glob) = Glob::new(pattern) else {
            warn!(%pattern, "invalid cache invalidation glob");
            return;
        };
        let matcher = glob.compile_matcher();

        self.local.retain(|key, _| !matcher.is_match(key));

        if let Err(err) = self.remote.invalidate(pattern).await {
            warn!(%pattern, error = %err, "remote cache invalidation failed");
        }
    }

    /// Current hit/miss/memory snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let memory_bytes = self.local.iter().map(|entry| entry.value.len()).sum();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys: self.local.len(),
            memory_bytes,
            uptime: self.started_at.elapsed(),
        }
    }

    /// Remove every expired local entry. Called by the background
    /// sweeper; exposed directly so tests don't need to wait out a real
    /// 60-second interval.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.local.retain(|_, entry| entry.expires_at > now);
    }

    fn insert_local(&self, key: String, value: Vec<u8>, ttl: Duration) {
        if self.local.len() >= self.max_local_entries && !self.local.contains_key(&key) {
            // Evict an arbitrary entry to make room; this tier is a cache,
            // not a source of truth.
            if let Some(victim) = self.local.iter().next().map(|e| e.key().clone()) {
                self.local.remove(&victim);
            }
        }
        self.local.insert(
            key,
            LocalEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Owns the background sweeper task for a [`CacheManager`].
pub struct SweeperHandle {
    shutdown: Arc<AtomicBool>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish its current
    /// tick.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.join_handle.await;
    }
}

/// Start a background task that sweeps expired local entries every 60
/// seconds until [`SweeperHandle::stop`] is called.
#[must_use]
pub fn start_sweeper(manager: Arc<CacheManager>) -> SweeperHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let task_shutdown = shutdown.clone();
    let join_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if task_shutdown.load(Ordering::SeqCst) {
                break;
            }
            manager.sweep_expired();
        }
    });
    SweeperHandle { shutdown, join_handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(NoopDistributedKv), Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn set_then_get_hits_locally() {
        let cache = manager();
        cache.set("greeting", b"hello".to_vec(), None).await;
        assert_eq!(cache.get("greeting").await, Some(b"hello".to_vec()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn missing_key_misses_both_tiers() {
        let cache = manager();
        assert_eq!(cache.get("missing").await, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_a_miss() {
        let cache = CacheManager::new(Arc::new(NoopDistributedKv), Duration::from_millis(1), 100);
        cache.set("k", b"v".to_vec(), None).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn invalidate_matches_glob_patterns() {
        let cache = manager();
        cache.set("user:1:profile", b"a".to_vec(), None).await;
        cache.set("user:2:profile", b"b".to_vec(), None).await;
        cache.set("team:1:profile", b"c".to_vec(), None).await;

        cache.invalidate("user:*:profile").await;

        assert_eq!(cache.get("user:1:profile").await, None);
        assert_eq!(cache.get("team:1:profile").await, Some(b"c".to_vec()));
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_stale_entries() {
        let cache = CacheManager::new(Arc::new(NoopDistributedKv), Duration::from_millis(1), 100);
        cache.set("stale", b"a".to_vec(), None).await;
        cache.set("fresh", b"b".to_vec(), Some(Duration::from_secs(60))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.sweep_expired();
        assert_eq!(cache.stats().keys, 1);
    }
}
