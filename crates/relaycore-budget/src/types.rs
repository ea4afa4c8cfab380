//! The budget subsystem's data model: definitions, usage records, derived
//! status, and the tagged decision types the pipeline consumes instead of
//! exceptions.

use chrono::{DateTime, Utc};
use relaycore_core::ScopeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a [`BudgetDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetId(pub Uuid);

impl BudgetId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for BudgetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of subject a budget is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// A single user.
    User,
    /// A team.
    Team,
    /// An organization.
    Organization,
    /// A project.
    Project,
}

/// The period a budget's allowance resets over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Resets daily.
    Daily,
    /// Resets weekly.
    Weekly,
    /// Resets monthly.
    Monthly,
    /// Resets quarterly.
    Quarterly,
    /// Resets annually.
    Annual,
    /// An explicit `(startDate, endDate)` with no implied recurrence.
    Custom,
}

impl Period {
    /// Derive an end date from `start` for every period except `Custom`,
    /// which must supply its own.
    #[must_use]
    pub fn derive_end_date(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => Some(start + chrono::Duration::days(1)),
            Self::Weekly => Some(start + chrono::Duration::weeks(1)),
            Self::Monthly => Some(start + chrono::Duration::days(30)),
            Self::Quarterly => Some(start + chrono::Duration::days(91)),
            Self::Annual => Some(start + chrono::Duration::days(365)),
            Self::Custom => None,
        }
    }
}

/// An action an alert threshold may trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertAction {
    /// Least restrictive: inform someone.
    Notify,
    /// Silently substitute a cheaper model.
    AutoDowngrade,
    /// Limit which models may be used.
    RestrictModels,
    /// Require a human approval step before proceeding.
    RequireApproval,
    /// Most restrictive: stop serving requests against this budget.
    BlockAll,
}

/// One alert threshold and the actions it triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Percent of the budget's amount at which this alert fires.
    pub threshold_percent: f64,
    /// Actions to take once this threshold is crossed, most permissive
    /// first is not required — `enforce_spending_limits` picks the most
    /// restrictive regardless of order.
    pub actions: Vec<AlertAction>,
    /// Whether this alert has already fired for the current continuous
    /// breach; re-armed when the budget's status drops back below the
    /// threshold.
    #[serde(default)]
    pub armed: bool,
}

/// A monetary allowance scoped to a subject, with a period and alert
/// thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetDefinition {
    /// Unique id.
    pub id: BudgetId,
    /// Human-readable name.
    pub name: String,
    /// Which kind of subject this is scoped to.
    pub scope_type: ScopeType,
    /// The subject's id within `scope_type`.
    pub scope_id: ScopeId,
    /// The allowance amount.
    pub amount: f64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Reset cadence.
    pub period: Period,
    /// When this budget's current window started.
    pub start_date: DateTime<Utc>,
    /// When this budget's current window ends.
    pub end_date: DateTime<Utc>,
    /// Whether a new window is created automatically when this one ends.
    pub recurring: bool,
    /// Alert thresholds.
    pub alerts: Vec<Alert>,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// The budget this one rolls up into, if any.
    pub parent_budget_id: Option<BudgetId>,
    /// Soft-delete flag.
    pub active: bool,
    /// Who created this budget.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Where a [`UsageRecord`] originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageSource {
    /// The `autmatrix` orchestration system.
    Autmatrix,
    /// RelayCore itself.
    Relaycore,
    /// The NeuroWeaver tuning service.
    Neuroweaver,
}

/// Metadata attached to a [`UsageRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// The request this usage was incurred by.
    pub request_id: Option<String>,
    /// The model used.
    pub model_id: Option<String>,
    /// The user attributed.
    pub user_id: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
}

/// One append-only spend event against a budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique id; replaying the same id must not double-count.
    pub id: Uuid,
    /// The budget this usage is recorded against.
    pub budget_id: BudgetId,
    /// The amount spent.
    pub amount: f64,
    /// The currency `amount` is denominated in.
    pub currency: String,
    /// When the spend occurred.
    pub timestamp: DateTime<Utc>,
    /// Where this record came from.
    pub source: UsageSource,
    /// Free-form description.
    pub description: Option<String>,
    /// Structured metadata.
    pub metadata: UsageMetadata,
    /// Set when `currency` differs from the budget's currency. Logged,
    /// not rejected, per the recorded open-question resolution.
    pub currency_mismatch: Option<String>,
}

/// The coarse health label derived from a budget's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetHealth {
    /// Below every alert threshold.
    Normal,
    /// At or above the lowest alert threshold.
    Warning,
    /// At or above the highest non-blocking threshold.
    Critical,
    /// At or beyond 100% of the budget's amount.
    Exceeded,
}

/// The derived current picture of a budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatusInfo {
    /// The budget this status describes.
    pub budget_id: BudgetId,
    /// Sum of usage in the active window.
    pub current_amount: f64,
    /// `100 * current_amount / amount`.
    pub percent_used: f64,
    /// `max(0, amount - current_amount)`.
    pub remaining: f64,
    /// Days left in the current window.
    pub days_remaining: f64,
    /// Rolling cost per day.
    pub burn_rate: f64,
    /// Linear extrapolation of total spend by the window's end.
    pub projected_total: f64,
    /// Coarse health label.
    pub status: BudgetHealth,
    /// When this snapshot was computed.
    pub last_updated: DateTime<Utc>,
    /// Alerts currently active (at or above their threshold).
    pub active_alerts: Vec<AlertAction>,
}

/// The result of a constraint check against a single budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintCheckResult {
    /// Whether the request may proceed against this budget.
    pub can_proceed: bool,
    /// Why not, if `can_proceed` is false.
    pub reason: Option<String>,
    /// Actions the caller should consider regardless of `can_proceed`.
    pub suggested_actions: Vec<AlertAction>,
}

/// A tagged decision from budget allocation, replacing exceptions for
/// control flow per the recorded design adaptation.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetDecision {
    /// Proceed with the request as-is.
    Proceed,
    /// Reject the request outright.
    Reject {
        /// Why the request was rejected.
        reason: String,
        /// Actions the caller may take.
        suggested_actions: Vec<AlertAction>,
    },
    /// Proceed, but substitute a cheaper model first.
    Downgrade {
        /// A hint for which model tier to target; the cost optimizer
        /// performs the actual substitution.
        target_hint: String,
    },
}
