//! # RelayCore Steering
//!
//! The rule-based steering engine: loads a declarative rule document and
//! turns each [`relaycore_core::AIRequest`] into a
//! [`relaycore_core::RoutingDecision`]. Evaluation never fails — a
//! malformed rule file fails validation once, at load time; after that,
//! every unexpected condition resolves to a tagged fallback decision.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget_book;
pub mod conditions;
pub mod cost;
pub mod engine;
pub mod types;

pub use budget_book::BudgetBook;
pub use engine::SteeringEngine;
pub use types::{
    Condition, ConditionOperator, CostConstraints, PerformanceThresholds, RoutingRule, RuleAction,
    RuleDocument,
};
