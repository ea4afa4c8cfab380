//! Budget Manager: scope-climbing constraint checks, cost-aware allocation
//! decisions, spending-limit enforcement, and cost reporting — the
//! subsystem's primary entry point for everything except raw CRUD.

use std::collections::HashMap;
use std::sync::Arc;

use relaycore_core::{AIRequest, RelayResult, ScopeId};
use relaycore_cost::{optimize_model_selection, CostPredictor};

use crate::registry::BudgetRegistry;
use crate::tracker::UsageTracker;
use crate::types::{AlertAction, BudgetDecision, BudgetDefinition, BudgetHealth, ConstraintCheckResult, ScopeType};

/// One scope to check, in climbing order (narrowest first).
#[derive(Debug, Clone)]
pub struct ScopeLink {
    /// The kind of subject.
    pub scope_type: ScopeType,
    /// The subject's id.
    pub scope_id: ScopeId,
}

/// A line item in a [`CostReport`].
#[derive(Debug, Clone)]
pub struct CostReportLine {
    /// The model usage is attributed to, or `"unknown"`.
    pub model_id: String,
    /// Total spend against this model in the reporting window.
    pub total_cost: f64,
    /// Number of usage records contributing to `total_cost`.
    pub request_count: u64,
}

/// A cost breakdown for a single budget over a time window.
#[derive(Debug, Clone)]
pub struct CostReport {
    /// Total spend across every model in the window.
    pub total_cost: f64,
    /// Per-model breakdown, descending by `total_cost`.
    pub by_model: Vec<CostReportLine>,
}

/// Coordinates budget lookups, cost prediction, and enforcement decisions.
pub struct BudgetManager {
    registry: Arc<BudgetRegistry>,
    tracker: Arc<UsageTracker>,
    cost_predictor: Arc<CostPredictor>,
}

impl BudgetManager {
    /// Construct a manager over the given registry, tracker, and cost
    /// predictor.
    #[must_use]
    pub fn new(registry: Arc<BudgetRegistry>, tracker: Arc<UsageTracker>, cost_predictor: Arc<CostPredictor>) -> Self {
        Self {
            registry,
            tracker,
            cost_predictor,
        }
    }

    /// Climb `scopes` narrowest-first, stopping at the first scope with an
    /// active budget that rejects `estimated_cost`. A scope with no budget
    /// defined imposes no constraint and is skipped.
    pub async fn check_budget(&self, scopes: &[ScopeLink], estimated_cost: f64) -> RelayResult<ConstraintCheckResult> {
        for scope in scopes {
            let budgets = self
                .registry
                .list(Some(scope.scope_type), Some(scope.scope_id.clone()), None, false)
                .await?;
            for budget in &budgets {
                let result = self.tracker.check_budget_constraints(budget, estimated_cost).await?;
                if !result.can_proceed {
                    return Ok(result);
                }
            }
        }
        Ok(ConstraintCheckResult {
            can_proceed: true,
            reason: None,
            suggested_actions: vec![],
        })
    }

    /// Predict the cost of `request` against the narrowest budget in
    /// `scopes` that has one defined, and decide whether to proceed,
    /// reject, or downgrade to a cheaper model.
    pub async fn allocate_budget(&self, request: &AIRequest, scopes: &[ScopeLink]) -> RelayResult<BudgetDecision> {
        let prediction = self.cost_predictor.predict_cost(request);

        let Some(budget) = self.narrowest_budget(scopes).await? else {
            return Ok(BudgetDecision::Proceed);
        };

        let status = self.tracker.get_budget_status(&budget).await?;

        match status.info.status {
            BudgetHealth::Exceeded => Ok(BudgetDecision::Reject {
                reason: format!("budget {} is exhausted", budget.id),
                suggested_actions: vec![AlertAction::BlockAll],
            }),
            BudgetHealth::Critical => {
                let selection = optimize_model_selection(&prediction, status.info.remaining);
                if selection.substituted {
                    Ok(BudgetDecision::Downgrade { target_hint: selection.model })
                } else if status.alerts.contains(&AlertAction::BlockAll) {
                    Ok(BudgetDecision::Reject {
                        reason: format!("budget {} is at a blocking alert threshold", budget.id),
                        suggested_actions: status.alerts.clone(),
                    })
                } else {
                    Ok(BudgetDecision::Proceed)
                }
            }
            BudgetHealth::Warning | BudgetHealth::Normal => {
                if prediction.estimated_cost > status.info.remaining {
                    Ok(BudgetDecision::Reject {
                        reason: format!("request would exceed the remaining budget for {}", budget.id),
                        suggested_actions: vec![AlertAction::Notify],
                    })
                } else {
                    Ok(BudgetDecision::Proceed)
                }
            }
        }
    }

    /// Record usage against an already-resolved budget. Exposed so
    /// [`crate::integration::BudgetIntegration`] can fan a single request's
    /// cost out across every scope it matches without reaching past the
    /// manager into the tracker directly.
    pub async fn record_usage_for(&self, _budget: &BudgetDefinition, record: crate::types::UsageRecord) -> RelayResult<()> {
        self.tracker.record_usage(record).await
    }

    /// The alert actions active for `budget` right now.
    pub async fn enforce_spending_limits(&self, budget: &BudgetDefinition) -> RelayResult<Vec<AlertAction>> {
        Ok(self.tracker.get_budget_status(budget).await?.alerts)
    }

    /// Summarize spend against `budget` in `[since, until)`, broken down by
    /// model.
    pub async fn generate_cost_report(
        &self,
        budget: &BudgetDefinition,
        since: chrono::DateTime<chrono::Utc>,
        until: chrono::DateTime<chrono::Utc>,
        store: &dyn crate::store::RelationalStore,
    ) -> RelayResult<CostReport> {
        let records = store.list_usage(budget.id, since, until).await?;
        let mut by_model: HashMap<String, (f64, u64)> = HashMap::new();
        let mut total_cost = 0.0;
        for record in &records {
            total_cost += record.amount;
            let entry = by_model
                .entry(record.metadata.model_id.clone().unwrap_or_else(|| "unknown".to_string()))
                .or_insert((0.0, 0));
            entry.0 += record.amount;
            entry.1 += 1;
        }
        let mut lines: Vec<CostReportLine> = by_model
            .into_iter()
            .map(|(model_id, (total, count))| CostReportLine {
                model_id,
                total_cost: total,
                request_count: count,
            })
            .collect();
        lines.sort_by(|a, b| b.total_cost.partial_cmp(&a.total_cost).unwrap());
        Ok(CostReport { total_cost, by_model: lines })
    }

    async fn narrowest_budget(&self, scopes: &[ScopeLink]) -> RelayResult<Option<BudgetDefinition>> {
        for scope in scopes {
            let budgets = self
                .registry
                .list(Some(scope.scope_type), Some(scope.scope_id.clone()), None, false)
                .await?;
            if let Some(budget) = budgets.into_iter().next() {
                return Ok(Some(budget));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{Alert, Period};
    use relaycore_core::request::AIRequestBuilder;
    use std::time::Duration;

    async fn setup(amount: f64, alerts: Vec<Alert>) -> (BudgetManager, Arc<InMemoryStore>, crate::types::BudgetDefinition) {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(BudgetRegistry::new(store.clone()));
        let tracker = Arc::new(UsageTracker::new(store.clone(), Duration::from_secs(0)));
        let predictor = Arc::new(CostPredictor::new());

        let budget = registry
            .create(
                "user budget".into(),
                ScopeType::User,
                ScopeId::new("u1"),
                amount,
                "USD".into(),
                Period::Monthly,
                chrono::Utc::now() - chrono::Duration::days(5),
                chrono::Utc::now() + chrono::Duration::days(25),
                true,
                alerts,
                vec![],
                None,
                "admin".into(),
            )
            .await
            .unwrap();

        (BudgetManager::new(registry, tracker, predictor), store, budget)
    }

    fn request(model: &str) -> AIRequest {
        AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model(model)
            .routing_profile_id("default")
            .prompt("hello there")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn no_budget_defined_always_proceeds() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(BudgetRegistry::new(store.clone()));
        let tracker = Arc::new(UsageTracker::new(store, Duration::from_secs(0)));
        let manager = BudgetManager::new(registry, tracker, Arc::new(CostPredictor::new()));

        let decision = manager
            .allocate_budget(&request("gpt-4"), &[ScopeLink { scope_type: ScopeType::User, scope_id: ScopeId::new("u1") }])
            .await
            .unwrap();
        assert_eq!(decision, BudgetDecision::Proceed);
    }

    #[tokio::test]
    async fn exhausted_budget_rejects() {
        let (manager, store, budget) = setup(0.01, vec![]).await;
        store
            .insert_usage(crate::types::UsageRecord {
                id: uuid::Uuid::new_v4(),
                budget_id: budget.id,
                amount: 0.02,
                currency: "USD".into(),
                timestamp: chrono::Utc::now(),
                source: crate::types::UsageSource::Relaycore,
                description: None,
                metadata: crate::types::UsageMetadata::default(),
                currency_mismatch: None,
            })
            .await
            .unwrap();

        let decision = manager
            .allocate_budget(&request("gpt-4"), &[ScopeLink { scope_type: ScopeType::User, scope_id: ScopeId::new("u1") }])
            .await
            .unwrap();
        assert!(matches!(decision, BudgetDecision::Reject { .. }));
    }

    #[tokio::test]
    async fn healthy_budget_proceeds() {
        let (manager, _store, budget) = setup(1000.0, vec![]).await;
        let decision = manager
            .allocate_budget(
                &request("gpt-3.5-turbo"),
                &[ScopeLink { scope_type: ScopeType::User, scope_id: budget.scope_id.clone() }],
            )
            .await
            .unwrap();
        assert_eq!(decision, BudgetDecision::Proceed);
    }
}
