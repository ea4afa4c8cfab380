//! # RelayCore Budget
//!
//! Budget definitions, usage tracking, scope-climbing constraint checks,
//! and cost-aware allocation decisions — the subsystem that turns a cost
//! prediction into a proceed/downgrade/reject decision.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod integration;
pub mod manager;
pub mod registry;
pub mod status_cache;
pub mod store;
pub mod tracker;
pub mod types;

pub use integration::{BudgetIntegration, NoOrganizationDirectory, UserDirectory};
pub use manager::{BudgetManager, CostReport, CostReportLine, ScopeLink};
pub use registry::BudgetRegistry;
pub use store::{InMemoryStore, RelationalStore};
pub use tracker::{start_status_sweeper, BudgetStatusInfoWithAlerts, StatusSweeperHandle, UsageTracker, DEFAULT_STATUS_TTL};
pub use types::{
    Alert, AlertAction, BudgetDecision, BudgetDefinition, BudgetHealth, BudgetId, BudgetStatusInfo,
    ConstraintCheckResult, Period, ScopeType, UsageMetadata, UsageRecord, UsageSource,
};
