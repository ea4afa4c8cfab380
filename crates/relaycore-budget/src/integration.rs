//! Pipeline facade: the narrow surface `relaycore-pipeline` calls into,
//! hiding the registry/tracker/manager wiring behind request-shaped
//! operations.

use std::sync::Arc;

use relaycore_core::{RelayResult, ScopeId, UserId};
use tracing::warn;

use crate::manager::{BudgetManager, ScopeLink};
use crate::registry::BudgetRegistry;
use crate::types::{ConstraintCheckResult, ScopeType, UsageMetadata, UsageRecord, UsageSource};

/// Resolves a user's organization membership. Kept as a trait rather than
/// a field on `AIRequest` because organization membership is managed
/// elsewhere and may require a lookup relaycore itself doesn't own.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// The organization `user_id` belongs to, if any.
    async fn organization_id(&self, user_id: &UserId) -> Option<ScopeId>;
}

/// A [`UserDirectory`] that reports no organization for anyone. Used when
/// no directory integration is configured.
#[derive(Debug, Default)]
pub struct NoOrganizationDirectory;

#[async_trait::async_trait]
impl UserDirectory for NoOrganizationDirectory {
    async fn organization_id(&self, _user_id: &UserId) -> Option<ScopeId> {
        None
    }
}

/// Ties the budget subsystem to request-shaped scopes (user, team,
/// project) for the pipeline to call directly.
pub struct BudgetIntegration {
    manager: Arc<BudgetManager>,
    registry: Arc<BudgetRegistry>,
    directory: Arc<dyn UserDirectory>,
}

impl BudgetIntegration {
    /// Construct an integration facade.
    #[must_use]
    pub fn new(manager: Arc<BudgetManager>, registry: Arc<BudgetRegistry>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            manager,
            registry,
            directory,
        }
    }

    /// Check `estimated_cost` against the user's, then the team's, then the
    /// project's budget, in that strict order, stopping at the first
    /// rejection.
    pub async fn check_request_constraints(
        &self,
        user_id: &UserId,
        team_id: Option<&ScopeId>,
        project_id: Option<&ScopeId>,
        estimated_cost: f64,
    ) -> RelayResult<ConstraintCheckResult> {
        let mut scopes = vec![ScopeLink {
            scope_type: ScopeType::User,
            scope_id: ScopeId::from(user_id),
        }];
        if let Some(team_id) = team_id {
            scopes.push(ScopeLink {
                scope_type: ScopeType::Team,
                scope_id: team_id.clone(),
            });
        }
        if let Some(project_id) = project_id {
            scopes.push(ScopeLink {
                scope_type: ScopeType::Project,
                scope_id: project_id.clone(),
            });
        }
        self.manager.check_budget(&scopes, estimated_cost).await
    }

    /// Record `amount` of usage against every active budget scoped to the
    /// user, the team (if any), the project (if any), and the user's
    /// organization (if the directory resolves one). A failure recording
    /// against one scope is logged and does not prevent recording against
    /// the others.
    pub async fn record_request_usage(
        &self,
        user_id: &UserId,
        team_id: Option<&ScopeId>,
        project_id: Option<&ScopeId>,
        amount: f64,
        currency: &str,
        model_id: Option<&str>,
        request_id: Option<&str>,
    ) {
        let mut scopes = vec![(ScopeType::User, ScopeId::from(user_id))];
        if let Some(team_id) = team_id {
            scopes.push((ScopeType::Team, team_id.clone()));
        }
        if let Some(project_id) = project_id {
            scopes.push((ScopeType::Project, project_id.clone()));
        }
        if let Some(org_id) = self.directory.organization_id(user_id).await {
            scopes.push((ScopeType::Organization, org_id));
        }

        for (scope_type, scope_id) in scopes {
            if let Err(err) = self.record_for_scope(scope_type, scope_id.clone(), amount, currency, model_id, request_id).await {
                warn!(scope = %scope_id, error = %err, "failed to record usage for scope");
            }
        }
    }

    async fn record_for_scope(
        &self,
        scope_type: ScopeType,
        scope_id: ScopeId,
        amount: f64,
        currency: &str,
        model_id: Option<&str>,
        request_id: Option<&str>,
    ) -> RelayResult<()> {
        let budgets = self.registry.list(Some(scope_type), Some(scope_id), None, false).await?;
        for budget in budgets {
            let currency_mismatch = (budget.currency != currency).then(|| budget.currency.clone());
            let record = UsageRecord {
                id: uuid::Uuid::new_v4(),
                budget_id: budget.id,
                amount,
                currency: currency.to_string(),
                timestamp: chrono::Utc::now(),
                source: UsageSource::Relaycore,
                description: None,
                metadata: UsageMetadata {
                    request_id: request_id.map(str::to_string),
                    model_id: model_id.map(str::to_string),
                    user_id: None,
                    tags: vec![],
                },
                currency_mismatch,
            };
            self.manager.record_usage_for(&budget, record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::tracker::UsageTracker;
    use crate::types::Period;
    use relaycore_cost::CostPredictor;
    use std::time::Duration;

    #[tokio::test]
    async fn checks_user_then_team_then_project_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(BudgetRegistry::new(store.clone()));
        let tracker = Arc::new(UsageTracker::new(store.clone(), Duration::from_secs(0)));
        let manager = Arc::new(BudgetManager::new(registry.clone(), tracker, Arc::new(CostPredictor::new())));
        let integration = BudgetIntegration::new(manager, registry.clone(), Arc::new(NoOrganizationDirectory));

        let user = UserId::new("u1").unwrap();
        registry
            .create(
                "user".into(),
                ScopeType::User,
                ScopeId::from(&user),
                0.0,
                "USD".into(),
                Period::Monthly,
                chrono::Utc::now() - chrono::Duration::days(1),
                chrono::Utc::now() + chrono::Duration::days(29),
                true,
                vec![],
                vec![],
                None,
                "admin".into(),
            )
            .await
            .unwrap();

        let result = integration.check_request_constraints(&user, None, None, 0.01).await.unwrap();
        assert!(!result.can_proceed);
    }

    #[tokio::test]
    async fn no_budgets_anywhere_always_proceeds() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(BudgetRegistry::new(store.clone()));
        let tracker = Arc::new(UsageTracker::new(store.clone(), Duration::from_secs(0)));
        let manager = Arc::new(BudgetManager::new(registry.clone(), tracker, Arc::new(CostPredictor::new())));
        let integration = BudgetIntegration::new(manager, registry, Arc::new(NoOrganizationDirectory));

        let user = UserId::new("u2").unwrap();
        let result = integration.check_request_constraints(&user, None, None, 5.0).await.unwrap();
        assert!(result.can_proceed);
    }
}
