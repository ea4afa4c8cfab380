//! Budget Registry: CRUD over [`BudgetDefinition`]s plus hierarchy lookups,
//! backed by a [`RelationalStore`].

use std::sync::Arc;

use chrono::Utc;
use relaycore_core::{RelayError, RelayResult, ScopeId};

use crate::store::RelationalStore;
use crate::types::{BudgetDefinition, BudgetId, Period, ScopeType};

/// CRUD and hierarchy access over budget definitions.
pub struct BudgetRegistry {
    store: Arc<dyn RelationalStore>,
}

impl BudgetRegistry {
    /// Construct a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    /// Create a new budget. `start_date`/`end_date` are taken as given;
    /// callers that want the period-derived default should compute it via
    /// [`Period::derive_end_date`] before calling.
    pub async fn create(
        &self,
        name: String,
        scope_type: ScopeType,
        scope_id: ScopeId,
        amount: f64,
        currency: String,
        period: Period,
        start_date: chrono::DateTime<Utc>,
        end_date: chrono::DateTime<Utc>,
        recurring: bool,
        alerts: Vec<crate::types::Alert>,
        tags: Vec<String>,
        parent_budget_id: Option<BudgetId>,
        created_by: String,
    ) -> RelayResult<BudgetDefinition> {
        if amount < 0.0 {
            return Err(RelayError::invalid_config("budget amount cannot be negative"));
        }
        if let Some(parent_id) = parent_budget_id {
            if self.store.get_budget(parent_id).await?.is_none() {
                return Err(RelayError::invalid_config("parent_budget_id does not reference an existing budget"));
            }
        }
        let now = Utc::now();
        let budget = BudgetDefinition {
            id: BudgetId::generate(),
            name,
            scope_type,
            scope_id,
            amount,
            currency,
            period,
            start_date,
            end_date,
            recurring,
            alerts,
            tags,
            parent_budget_id,
            active: true,
            created_by,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_budget(budget.clone()).await?;
        Ok(budget)
    }

    /// Fetch a budget by id.
    pub async fn get(&self, id: BudgetId) -> RelayResult<Option<BudgetDefinition>> {
        self.store.get_budget(id).await
    }

    /// Apply `mutate` to the stored budget and persist the result, bumping
    /// `updated_at`. Returns `RelayError::BudgetNotFound` if `id` doesn't
    /// exist.
    pub async fn update(&self, id: BudgetId, mutate: impl FnOnce(&mut BudgetDefinition)) -> RelayResult<BudgetDefinition> {
        let Some(mut budget) = self.store.get_budget(id).await? else {
            return Err(RelayError::budget_not_found(&ScopeId::new(id.to_string())));
        };
        mutate(&mut budget);
        budget.updated_at = Utc::now();
        self.store.update_budget(budget.clone()).await?;
        Ok(budget)
    }

    /// Soft-delete (deactivate) a budget without removing its history.
    pub async fn soft_delete(&self, id: BudgetId) -> RelayResult<()> {
        self.store.soft_delete_budget(id).await
    }

    /// List budgets matching the given, all-optional, filters.
    pub async fn list(
        &self,
        scope_type: Option<ScopeType>,
        scope_id: Option<ScopeId>,
        parent_budget_id: Option<BudgetId>,
        include_inactive: bool,
    ) -> RelayResult<Vec<BudgetDefinition>> {
        self.store.list_budgets(scope_type, scope_id, parent_budget_id, include_inactive).await
    }

    /// Walk from `id` up through `parent_budget_id` links to the root,
    /// returning the chain starting with `id` itself. Guards against a
    /// cyclic `parent_budget_id` chain by bounding the walk at the number
    /// of distinct budgets already visited.
    pub async fn get_hierarchy(&self, id: BudgetId) -> RelayResult<Vec<BudgetDefinition>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        let mut visited = std::collections::HashSet::new();

        while let Some(budget_id) = current {
            if !visited.insert(budget_id) {
                break;
            }
            let Some(budget) = self.store.get_budget(budget_id).await? else {
                break;
            };
            current = budget.parent_budget_id;
            chain.push(budget);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn registry() -> BudgetRegistry {
        BudgetRegistry::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn create_then_get_then_update_round_trips() {
        let registry = registry();
        let created = registry
            .create(
                "team budget".into(),
                ScopeType::Team,
                ScopeId::new("team-1"),
                100.0,
                "USD".into(),
                Period::Monthly,
                Utc::now(),
                Utc::now() + chrono::Duration::days(30),
                true,
                vec![],
                vec![],
                None,
                "admin".into(),
            )
            .await
            .unwrap();

        let fetched = registry.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.amount, 100.0);

        let updated = registry.update(created.id, |b| b.amount = 150.0).await.unwrap();
        assert_eq!(updated.amount, 150.0);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn soft_delete_marks_inactive_without_removing() {
        let registry = registry();
        let created = registry
            .create(
                "personal".into(),
                ScopeType::User,
                ScopeId::new("u1"),
                10.0,
                "USD".into(),
                Period::Daily,
                Utc::now(),
                Utc::now() + chrono::Duration::days(1),
                false,
                vec![],
                vec![],
                None,
                "admin".into(),
            )
            .await
            .unwrap();

        registry.soft_delete(created.id).await.unwrap();
        let fetched = registry.get(created.id).await.unwrap().unwrap();
        assert!(!fetched.active);

        let visible = registry.list(None, None, None, false).await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn hierarchy_walks_parent_chain() {
        let registry = registry();
        let org = registry
            .create(
                "org".into(),
                ScopeType::Organization,
                ScopeId::new("org-1"),
                1000.0,
                "USD".into(),
                Period::Monthly,
                Utc::now(),
                Utc::now() + chrono::Duration::days(30),
                true,
                vec![],
                vec![],
                None,
                "admin".into(),
            )
            .await
            .unwrap();
        let team = registry
            .create(
                "team".into(),
                ScopeType::Team,
                ScopeId::new("team-1"),
                200.0,
                "USD".into(),
                Period::Monthly,
                Utc::now(),
                Utc::now() + chrono::Duration::days(30),
                true,
                vec![],
                vec![],
                Some(org.id),
                "admin".into(),
            )
            .await
            .unwrap();

        let chain = registry.get_hierarchy(team.id).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, team.id);
        assert_eq!(chain[1].id, org.id);
    }

    #[tokio::test]
    async fn create_rejects_unknown_parent() {
        let registry = registry();
        let result = registry
            .create(
                "team".into(),
                ScopeType::Team,
                ScopeId::new("team-1"),
                200.0,
                "USD".into(),
                Period::Monthly,
                Utc::now(),
                Utc::now() + chrono::Duration::days(30),
                true,
                vec![],
                vec![],
                Some(BudgetId::generate()),
                "admin".into(),
            )
            .await;
        assert!(result.is_err());
    }
}
