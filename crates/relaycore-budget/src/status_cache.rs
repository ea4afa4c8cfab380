//! A process-local, short-TTL cache in front of [`crate::tracker`]'s status
//! recomputation, so a burst of requests against the same budget doesn't
//! each pay for a full usage-sum query.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::types::{BudgetId, BudgetStatusInfo};

/// Caches [`BudgetStatusInfo`] per budget for a fixed TTL, invalidated
/// early whenever new usage is recorded against that budget.
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    entries: DashMap<BudgetId, (BudgetStatusInfo, Instant)>,
}

impl StatusCache {
    /// Construct a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Return a cached status if present and not yet expired.
    #[must_use]
    pub fn get(&self, budget_id: BudgetId) -> Option<BudgetStatusInfo> {
        self.entries.get(&budget_id).and_then(|entry| {
            let (status, cached_at) = entry.value();
            (cached_at.elapsed() < self.ttl).then(|| status.clone())
        })
    }

    /// Store a freshly computed status.
    pub fn put(&self, status: BudgetStatusInfo) {
        self.entries.insert(status.budget_id, (status, Instant::now()));
    }

    /// Evict a budget's cached status, forcing the next `get` to miss.
    pub fn invalidate(&self, budget_id: BudgetId) {
        self.entries.remove(&budget_id);
    }

    /// Drop every entry past its TTL. `get` already treats an expired entry
    /// as a miss; this bounds the map's memory for budgets that stop being
    /// queried instead of relying on the next `get` to clear them out.
    pub fn sweep_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, cached_at)| cached_at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BudgetHealth;

    fn status(budget_id: BudgetId) -> BudgetStatusInfo {
        BudgetStatusInfo {
            budget_id,
            current_amount: 10.0,
            percent_used: 10.0,
            remaining: 90.0,
            days_remaining: 20.0,
            burn_rate: 0.5,
            projected_total: 15.0,
            status: BudgetHealth::Normal,
            last_updated: chrono::Utc::now(),
            active_alerts: vec![],
        }
    }

    #[test]
    fn put_then_get_hits_within_ttl() {
        let cache = StatusCache::new(Duration::from_secs(300));
        let id = BudgetId::generate();
        cache.put(status(id));
        assert!(cache.get(id).is_some());
    }

    #[test]
    fn invalidate_forces_a_miss() {
        let cache = StatusCache::new(Duration::from_secs(300));
        let id = BudgetId::generate();
        cache.put(status(id));
        cache.invalidate(id);
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = StatusCache::new(Duration::from_millis(1));
        let id = BudgetId::generate();
        cache.put(status(id));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(id).is_none());
    }
}
