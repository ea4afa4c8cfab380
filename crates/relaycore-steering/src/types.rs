//! The declarative rule document shape: `routing_rules`, `cost_constraints`,
//! `performance_thresholds`.

use serde::{Deserialize, Serialize};

/// A single condition operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field value equals the condition's value.
    Equals,
    /// Field is present (`value: true`) or absent (`value: false`).
    Exists,
    /// Field's length is strictly less than the condition's numeric value.
    LengthLessThan,
    /// Field's length is strictly greater than the condition's numeric
    /// value.
    LengthGreaterThan,
    /// Field's string representation contains the condition's value as a
    /// substring.
    Contains,
}

/// One condition inside a [`RoutingRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted field path, e.g. `"context.user.tier"`, or the virtual field
    /// `"profile"`.
    pub field: String,
    /// The operator to apply.
    pub operator: ConditionOperator,
    /// The comparison value. Absent only for `exists` style checks that
    /// default to requiring presence.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// The provider/model choice a matched rule prescribes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    /// Provider to route to.
    pub provider: String,
    /// Model to route to.
    pub model: String,
    /// Multiplier applied to the base estimated cost.
    #[serde(default = "RuleAction::default_cost_multiplier")]
    pub cost_multiplier: f64,
    /// Maximum latency this action is expected to incur, in milliseconds.
    pub max_latency_ms: u32,
}

impl RuleAction {
    const fn default_cost_multiplier() -> f64 {
        1.0
    }
}

/// One `(conditions → action)` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    /// The rule's name; `"default"` is special-cased as the no-match
    /// fallback.
    pub name: String,
    /// Higher priority rules are evaluated first.
    pub priority: i32,
    /// All conditions must match for this rule to apply.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// What to do when this rule matches.
    pub action: RuleAction,
}

/// Global cost guardrails evaluated before accepting a matched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConstraints {
    /// Deployment-wide daily spend ceiling, in USD.
    pub daily_budget: f64,
    /// Per-request cost ceiling, in USD.
    pub per_request_max: f64,
    /// Fraction of `daily_budget` at which an emergency posture applies.
    #[serde(default)]
    pub emergency_threshold: f64,
}

/// Latency/reliability thresholds carried through from the rule file for
/// downstream consumers (the resilience layer reads these via the pipeline
/// assembler; the engine itself only loads and validates them).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceThresholds {
    /// Maximum acceptable latency, in milliseconds.
    #[serde(default)]
    pub max_latency: Option<u32>,
    /// Minimum acceptable success rate, in `[0, 1]`.
    #[serde(default)]
    pub min_success_rate: Option<f64>,
    /// Maximum acceptable error rate, in `[0, 1]`.
    #[serde(default)]
    pub max_error_rate: Option<f64>,
}

/// The full declarative rule document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    /// The rule list, in file order (sorted by descending priority at
    /// load time, not necessarily in the file).
    pub routing_rules: Vec<RoutingRule>,
    /// Cost guardrails.
    pub cost_constraints: CostConstraints,
    /// Latency/reliability thresholds.
    #[serde(default)]
    pub performance_thresholds: PerformanceThresholds,
}
