//! The persistence boundary the budget subsystem depends on instead of a
//! concrete database client. `relaycore-integrations` supplies the real
//! implementation; tests use an in-memory one.

use async_trait::async_trait;
use relaycore_core::{RelayResult, ScopeId};

use crate::types::{BudgetDefinition, BudgetId, ScopeType, UsageRecord};

/// CRUD access to budget definitions and usage records. Every method is
/// fallible with [`relaycore_core::RelayError::TransientStoreError`] so the
/// pipeline can distinguish "no such budget" (`Ok(None)`) from "store is
/// unreachable" (`Err`).
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Persist a newly created budget.
    async fn insert_budget(&self, budget: BudgetDefinition) -> RelayResult<()>;

    /// Fetch a budget by id, `Ok(None)` if it doesn't exist.
    async fn get_budget(&self, id: BudgetId) -> RelayResult<Option<BudgetDefinition>>;

    /// Overwrite a budget's stored fields. The caller is responsible for
    /// bumping `updated_at`.
    async fn update_budget(&self, budget: BudgetDefinition) -> RelayResult<()>;

    /// Mark a budget inactive without removing it.
    async fn soft_delete_budget(&self, id: BudgetId) -> RelayResult<()>;

    /// List budgets matching the given filters, all optional and
    /// conjunctive. `include_inactive` defaults the caller would otherwise
    /// need to apply themselves is handled here.
    async fn list_budgets(
        &self,
        scope_type: Option<ScopeType>,
        scope_id: Option<ScopeId>,
        parent_budget_id: Option<BudgetId>,
        include_inactive: bool,
    ) -> RelayResult<Vec<BudgetDefinition>>;

    /// Append a usage record. Implementations must treat a repeated `id` as
    /// a no-op rather than double-counting spend.
    async fn insert_usage(&self, record: UsageRecord) -> RelayResult<()>;

    /// Sum usage amounts recorded against `budget_id` within
    /// `[since, until)`.
    async fn sum_usage(&self, budget_id: BudgetId, since: chrono::DateTime<chrono::Utc>, until: chrono::DateTime<chrono::Utc>) -> RelayResult<f64>;

    /// List the individual usage records recorded against `budget_id`
    /// within `[since, until)`, for reporting.
    async fn list_usage(
        &self,
        budget_id: BudgetId,
        since: chrono::DateTime<chrono::Utc>,
        until: chrono::DateTime<chrono::Utc>,
    ) -> RelayResult<Vec<UsageRecord>>;
}

/// A process-local, non-persistent [`RelationalStore`] used by tests and by
/// standalone runs with no external database configured.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    budgets: parking_lot::RwLock<std::collections::HashMap<BudgetId, BudgetDefinition>>,
    usage: parking_lot::RwLock<Vec<UsageRecord>>,
    seen_usage_ids: parking_lot::RwLock<std::collections::HashSet<uuid::Uuid>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn insert_budget(&self, budget: BudgetDefinition) -> RelayResult<()> {
        self.budgets.write().insert(budget.id, budget);
        Ok(())
    }

    async fn get_budget(&self, id: BudgetId) -> RelayResult<Option<BudgetDefinition>> {
        Ok(self.budgets.read().get(&id).cloned())
    }

    async fn update_budget(&self, budget: BudgetDefinition) -> RelayResult<()> {
        self.budgets.write().insert(budget.id, budget);
        Ok(())
    }

    async fn soft_delete_budget(&self, id: BudgetId) -> RelayResult<()> {
        if let Some(budget) = self.budgets.write().get_mut(&id) {
            budget.active = false;
        }
        Ok(())
    }

    async fn list_budgets(
        &self,
        scope_type: Option<ScopeType>,
        scope_id: Option<ScopeId>,
        parent_budget_id: Option<BudgetId>,
        include_inactive: bool,
    ) -> RelayResult<Vec<BudgetDefinition>> {
        Ok(self
            .budgets
            .read()
            .values()
            .filter(|b| include_inactive || b.active)
            .filter(|b| scope_type.map_or(true, |st| b.scope_type == st))
            .filter(|b| scope_id.as_ref().map_or(true, |sid| &b.scope_id == sid))
            .filter(|b| parent_budget_id.map_or(true, |pid| b.parent_budget_id == Some(pid)))
            .cloned()
            .collect())
    }

    async fn insert_usage(&self, record: UsageRecord) -> RelayResult<()> {
        if !self.seen_usage_ids.write().insert(record.id) {
            return Ok(());
        }
        self.usage.write().push(record);
        Ok(())
    }

    async fn sum_usage(
        &self,
        budget_id: BudgetId,
        since: chrono::DateTime<chrono::Utc>,
        until: chrono::DateTime<chrono::Utc>,
    ) -> RelayResult<f64> {
        Ok(self
            .usage
            .read()
            .iter()
            .filter(|r| r.budget_id == budget_id && r.timestamp >= since && r.timestamp < until)
            .map(|r| r.amount)
            .sum())
    }

    async fn list_usage(
        &self,
        budget_id: BudgetId,
        since: chrono::DateTime<chrono::Utc>,
        until: chrono::DateTime<chrono::Utc>,
    ) -> RelayResult<Vec<UsageRecord>> {
        Ok(self
            .usage
            .read()
            .iter()
            .filter(|r| r.budget_id == budget_id && r.timestamp >= since && r.timestamp < until)
            .cloned()
            .collect())
    }
}
