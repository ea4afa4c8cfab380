//! Usage Tracker: records spend, derives [`BudgetStatusInfo`] (through the
//! 5-minute [`StatusCache`]), and walks a budget's alert thresholds to
//! decide what the caller should do next.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relaycore_core::RelayResult;

use crate::status_cache::StatusCache;
use crate::store::RelationalStore;
use crate::types::{
    Alert, AlertAction, BudgetDefinition, BudgetHealth, BudgetId, ConstraintCheckResult, UsageRecord,
};

/// Default TTL for cached budget status, matching the ambient config
/// default of 300 seconds.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(300);

/// Records usage and derives budget status/constraint decisions.
pub struct UsageTracker {
    store: Arc<dyn RelationalStore>,
    cache: StatusCache,
    /// Per-`(budget, threshold)` arm state for alert de-dup: `true` means
    /// the threshold has not fired since it was last clear.
    armed: dashmap::DashMap<(BudgetId, u64), bool>,
}

impl UsageTracker {
    /// Construct a tracker with the given status-cache TTL.
    #[must_use]
    pub fn new(store: Arc<dyn RelationalStore>, status_ttl: Duration) -> Self {
        Self {
            store,
            cache: StatusCache::new(status_ttl),
            armed: dashmap::DashMap::new(),
        }
    }

    /// Emit one `tracing::warn!` per alert threshold the first time
    /// `percent_used` crosses it, then re-arm once usage drops back below
    /// it — "once per continuous breach, re-armed on clear".
    fn notify_alert_transitions(&self, budget: &BudgetDefinition, percent_used: f64) {
        for alert in &budget.alerts {
            let key = (budget.id, alert.threshold_percent.to_bits());
            let breached = percent_used >= alert.threshold_percent;
            let mut entry = self.armed.entry(key).or_insert(true);
            if breached {
                if *entry {
                    tracing::warn!(
                        budget_id = %budget.id,
                        threshold_percent = alert.threshold_percent,
                        actions = ?alert.actions,
                        "budget alert threshold crossed"
                    );
                    *entry = false;
                }
            } else {
                *entry = true;
            }
        }
    }

    /// Append a usage record and invalidate the cached status for its
    /// budget so the next read recomputes.
    pub async fn record_usage(&self, record: UsageRecord) -> RelayResult<()> {
        let budget_id = record.budget_id;
        self.store.insert_usage(record).await?;
        self.cache.invalidate(budget_id);
        Ok(())
    }

    /// Return the current status of `budget`, recomputing from stored usage
    /// if the cached value has expired.
    pub async fn get_budget_status(&self, budget: &BudgetDefinition) -> RelayResult<BudgetStatusInfoWithAlerts> {
        if let Some(cached) = self.cache.get(budget.id) {
            self.notify_alert_transitions(budget, cached.percent_used);
            let alerts = self.active_alerts(budget, cached.percent_used);
            return Ok(BudgetStatusInfoWithAlerts { info: cached, alerts });
        }

        let current_amount = self.store.sum_usage(budget.id, budget.start_date, budget.end_date).await?;
        let info = derive_status(budget, current_amount);
        self.cache.put(info.clone());
        self.notify_alert_transitions(budget, info.percent_used);
        let alerts = self.active_alerts(budget, info.percent_used);
        Ok(BudgetStatusInfoWithAlerts { info, alerts })
    }

    /// Check whether a request estimated to cost `estimated_cost` may
    /// proceed against `budget`, walking configured alert thresholds from
    /// the highest crossed one down to pick the most restrictive action.
    pub async fn check_budget_constraints(
        &self,
        budget: &BudgetDefinition,
        estimated_cost: f64,
    ) -> RelayResult<ConstraintCheckResult> {
        let status = self.get_budget_status(budget).await?;
        let projected_percent = if budget.amount > 0.0 {
            100.0 * (status.info.current_amount + estimated_cost) / budget.amount
        } else if estimated_cost > 0.0 {
            // A zero-amount budget with any positive estimated spend is
            // immediately exceeded.
            100.1
        } else {
            0.0
        };

        if projected_percent >= 100.0 {
            return Ok(ConstraintCheckResult {
                can_proceed: false,
                reason: Some(format!(
                    "budget {} would be exceeded: {:.2}% projected usage",
                    budget.id, projected_percent
                )),
                suggested_actions: vec![AlertAction::BlockAll],
            });
        }

        let crossed = most_restrictive_alert(budget, projected_percent);
        let suggested_actions = crossed.map(|alert| alert.actions.clone()).unwrap_or_default();
        let blocks = suggested_actions.contains(&AlertAction::BlockAll) || suggested_actions.contains(&AlertAction::RequireApproval);

        Ok(ConstraintCheckResult {
            can_proceed: !blocks,
            reason: blocks.then(|| format!("budget {} alert threshold requires blocking", budget.id)),
            suggested_actions,
        })
    }

    fn active_alerts(&self, budget: &BudgetDefinition, percent_used: f64) -> Vec<AlertAction> {
        most_restrictive_alert(budget, percent_used)
            .map(|alert| alert.actions.clone())
            .unwrap_or_default()
    }

    /// Drop expired entries from the status cache. Called periodically by
    /// [`start_status_sweeper`]; safe to call at any time otherwise.
    pub fn sweep_status_cache(&self) {
        self.cache.sweep_expired();
    }
}

/// Owns the background task that periodically sweeps a tracker's status
/// cache. Mirrors `relaycore_cache`'s `SweeperHandle`: the task keeps
/// running until [`StatusSweeperHandle::stop`] is called.
pub struct StatusSweeperHandle {
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl StatusSweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish its current
    /// tick.
    pub async fn stop(self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = self.join_handle.await;
    }
}

/// Start a background task that sweeps `tracker`'s expired status-cache
/// entries every 60 seconds until [`StatusSweeperHandle::stop`] is called.
#[must_use]
pub fn start_status_sweeper(tracker: Arc<UsageTracker>) -> StatusSweeperHandle {
    use std::sync::atomic::{AtomicBool, Ordering};

    let shutdown = Arc::new(AtomicBool::new(false));
    let task_shutdown = Arc::clone(&shutdown);
    let join_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if task_shutdown.load(Ordering::SeqCst) {
                break;
            }
            tracker.sweep_status_cache();
        }
    });
    StatusSweeperHandle { shutdown, join_handle }
}

/// [`crate::types::BudgetStatusInfo`] plus the alert actions currently
/// active at its percent-used.
#[derive(Debug, Clone)]
pub struct BudgetStatusInfoWithAlerts {
    /// The derived status.
    pub info: crate::types::BudgetStatusInfo,
    /// Actions from the highest alert threshold crossed.
    pub alerts: Vec<AlertAction>,
}

fn most_restrictive_alert(budget: &BudgetDefinition, percent_used: f64) -> Option<&Alert> {
    budget
        .alerts
        .iter()
        .filter(|alert| percent_used >= alert.threshold_percent)
        .max_by(|a, b| a.threshold_percent.partial_cmp(&b.threshold_percent).unwrap())
}

fn derive_status(budget: &BudgetDefinition, current_amount: f64) -> crate::types::BudgetStatusInfo {
    let now = Utc::now();
    let percent_used = if budget.amount > 0.0 {
        100.0 * current_amount / budget.amount
    } else if current_amount > 0.0 {
        100.1
    } else {
        0.0
    };
    let remaining = (budget.amount - current_amount).max(0.0);

    let window_total_days = (budget.end_date - budget.start_date).num_seconds() as f64 / 86_400.0;
    let elapsed_days = (now - budget.start_date).num_seconds() as f64 / 86_400.0;
    let days_remaining = (window_total_days - elapsed_days).max(0.0);

    let burn_rate = if elapsed_days > 0.0 { current_amount / elapsed_days } else { current_amount };
    let projected_total = if window_total_days > 0.0 { burn_rate * window_total_days } else { current_amount };

    let status = if percent_used >= 100.0 {
        BudgetHealth::Exceeded
    } else if budget.alerts.iter().any(|alert| alert.threshold_percent >= 80.0 && percent_used >= alert.threshold_percent) {
        BudgetHealth::Critical
    } else if budget.alerts.iter().any(|alert| percent_used >= alert.threshold_percent) {
        BudgetHealth::Warning
    } else {
        BudgetHealth::Normal
    };

    crate::types::BudgetStatusInfo {
        budget_id: budget.id,
        current_amount,
        percent_used,
        remaining,
        days_remaining,
        burn_rate,
        projected_total,
        status,
        last_updated: now,
        active_alerts: most_restrictive_alert(budget, percent_used).map(|alert| alert.actions.clone()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{BudgetDefinition, Period, ScopeType, UsageMetadata, UsageSource};
    use relaycore_core::ScopeId;

    fn budget(amount: f64, alerts: Vec<Alert>) -> BudgetDefinition {
        let now = Utc::now();
        BudgetDefinition {
            id: BudgetId::generate(),
            name: "test".into(),
            scope_type: ScopeType::User,
            scope_id: ScopeId::new("u1"),
            amount,
            currency: "USD".into(),
            period: Period::Monthly,
            start_date: now - chrono::Duration::days(10),
            end_date: now + chrono::Duration::days(20),
            recurring: true,
            alerts,
            tags: vec![],
            parent_budget_id: None,
            active: true,
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn usage(budget_id: BudgetId, amount: f64) -> UsageRecord {
        UsageRecord {
            id: uuid::Uuid::new_v4(),
            budget_id,
            amount,
            currency: "USD".into(),
            timestamp: Utc::now(),
            source: UsageSource::Relaycore,
            description: None,
            metadata: UsageMetadata::default(),
            currency_mismatch: None,
        }
    }

    #[tokio::test]
    async fn zero_amount_budget_is_exceeded_by_any_positive_usage() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = UsageTracker::new(store.clone(), Duration::from_secs(0));
        let budget = budget(0.0, vec![]);
        store.insert_budget(budget.clone()).await.unwrap();
        tracker.record_usage(usage(budget.id, 0.01)).await.unwrap();

        let status = tracker.get_budget_status(&budget).await.unwrap();
        assert_eq!(status.info.status, BudgetHealth::Exceeded);
    }

    #[tokio::test]
    async fn zero_remaining_with_zero_estimated_cost_can_proceed() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = UsageTracker::new(store.clone(), Duration::from_secs(0));
        let budget = budget(100.0, vec![]);
        store.insert_budget(budget.clone()).await.unwrap();
        tracker.record_usage(usage(budget.id, 100.0)).await.unwrap();

        let result = tracker.check_budget_constraints(&budget, 0.0).await.unwrap();
        assert!(result.can_proceed);
    }

    #[tokio::test]
    async fn alert_threshold_crossing_surfaces_its_actions() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = UsageTracker::new(store.clone(), Duration::from_secs(0));
        let budget = budget(
            100.0,
            vec![
                Alert { threshold_percent: 50.0, actions: vec![AlertAction::Notify], armed: false },
                Alert { threshold_percent: 90.0, actions: vec![AlertAction::RequireApproval], armed: false },
            ],
        );
        store.insert_budget(budget.clone()).await.unwrap();
        tracker.record_usage(usage(budget.id, 60.0)).await.unwrap();

        let result = tracker.check_budget_constraints(&budget, 0.0).await.unwrap();
        assert!(result.can_proceed);
        assert_eq!(result.suggested_actions, vec![AlertAction::Notify]);
    }

    #[tokio::test]
    async fn projected_overspend_rejects_before_the_record_lands() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = UsageTracker::new(store.clone(), Duration::from_secs(0));
        let budget = budget(100.0, vec![]);
        store.insert_budget(budget.clone()).await.unwrap();
        tracker.record_usage(usage(budget.id, 95.0)).await.unwrap();

        let result = tracker.check_budget_constraints(&budget, 10.0).await.unwrap();
        assert!(!result.can_proceed);
    }

    #[tokio::test]
    async fn alert_rearms_after_usage_drops_back_below_threshold() {
        let store = Arc::new(InMemoryStore::new());
        let tracker = UsageTracker::new(store.clone(), Duration::from_secs(0));
        let budget = budget(
            100.0,
            vec![Alert { threshold_percent: 50.0, actions: vec![AlertAction::Notify], armed: false }],
        );
        store.insert_budget(budget.clone()).await.unwrap();

        let key = (budget.id, 50.0_f64.to_bits());
        tracker.record_usage(usage(budget.id, 60.0)).await.unwrap();
        tracker.get_budget_status(&budget).await.unwrap();
        assert_eq!(*tracker.armed.get(&key).unwrap(), false, "fired once while breached");

        // A second poll at the same percent-used must not re-fire.
        tracker.get_budget_status(&budget).await.unwrap();
        assert_eq!(*tracker.armed.get(&key).unwrap(), false);

        // Usage corrected back under the threshold re-arms it.
        let store2 = Arc::new(InMemoryStore::new());
        let tracker2 = UsageTracker::new(store2.clone(), Duration::from_secs(0));
        store2.insert_budget(budget.clone()).await.unwrap();
        tracker2.record_usage(usage(budget.id, 10.0)).await.unwrap();
        tracker2.get_budget_status(&budget).await.unwrap();
        assert_eq!(*tracker2.armed.get(&key).unwrap(), true);
    }
}
