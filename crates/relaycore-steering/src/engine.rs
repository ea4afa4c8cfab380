//! The steering engine: loads a declarative rule set and turns each
//! request into a [`RoutingDecision`].

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use relaycore_core::{AIRequest, ModelId, ProviderId, RelayError, RelayResult, RoutingDecision};

use crate::budget_book::BudgetBook;
use crate::conditions::all_match;
use crate::cost::{base_cost, confidence};
use crate::types::{CostConstraints, PerformanceThresholds, RoutingRule, RuleDocument};

const FALLBACK_PROVIDER: &str = "openai";
const FALLBACK_MODEL: &str = "gpt-3.5-turbo";
const FALLBACK_COST: f64 = 0.002;
const FALLBACK_LATENCY_MS: u32 = 2000;
const FALLBACK_CONFIDENCE: f64 = 0.7;

/// Rule-based routing engine. Holds the loaded rule set (re-orderable via
/// [`Self::reload`]) and the engine-owned [`BudgetBook`].
pub struct SteeringEngine {
    rules_path: PathBuf,
    rules: Vec<RoutingRule>,
    cost_constraints: CostConstraints,
    performance_thresholds: PerformanceThresholds,
    budget_book: Mutex<BudgetBook>,
}

impl SteeringEngine {
    /// Load a rule document from `path` (YAML) and construct the engine.
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidConfig`] if the file cannot be read or
    /// fails to parse, or if it contains no `default` rule and relies
    /// entirely on matches (a missing `default` is allowed — the fixed
    /// fallback covers it — but duplicate rule names are rejected).
    pub fn load(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            RelayError::invalid_config(format!("cannot read rules file {}: {err}", path.display()))
        })?;
        let document: RuleDocument = serde_yaml::from_str(&raw)
            .map_err(|err| RelayError::invalid_config(format!("invalid rules file: {err}")))?;
        Self::from_document(path.to_path_buf(), document)
    }

    fn from_document(rules_path: PathBuf, document: RuleDocument) -> RelayResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for rule in &document.routing_rules {
            if !seen.insert(rule.name.clone()) {
                return Err(RelayError::invalid_config(format!(
                    "duplicate rule name: {}",
                    rule.name
                )));
            }
        }
        let mut rules = document.routing_rules;
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self {
            rules_path,
            rules,
            cost_constraints: document.cost_constraints,
            performance_thresholds: document.performance_thresholds,
            budget_book: Mutex::new(BudgetBook::new()),
        })
    }

    /// Re-read the rule file from disk, replacing the in-memory rule set.
    /// The budget book is left untouched.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    pub fn reload(&mut self) -> RelayResult<()> {
        let reloaded = Self::load(&self.rules_path)?;
        self.rules = reloaded.rules;
        self.cost_constraints = reloaded.cost_constraints;
        self.performance_thresholds = reloaded.performance_thresholds;
        Ok(())
    }

    /// Current latency/reliability thresholds from the rule file.
    #[must_use]
    pub const fn performance_thresholds(&self) -> &PerformanceThresholds {
        &self.performance_thresholds
    }

    /// Snapshot of the engine's accumulated daily spend and request count.
    #[must_use]
    pub fn budget_book_snapshot(&self) -> BudgetBook {
        *self.budget_book.lock()
    }

    /// Reset the engine's budget book, e.g. at a daily rollover boundary
    /// or deterministically between tests.
    pub fn reset_budget_book(&self) {
        self.budget_book.lock().reset();
    }

    /// Decide which provider/model to route `request` to under
    /// `profile_id`. Never returns an error: any unexpected internal
    /// condition is absorbed into the `error_fallback`-tagged fallback
    /// decision rather than propagated.
    #[must_use]
    pub fn decide(&self, request: &AIRequest, profile_id: &str) -> RoutingDecision {
        let prompt_len = request.prompt_char_len();

        {
            let book = self.budget_book.lock();
            if book.daily_spend() >= self.cost_constraints.daily_budget {
                drop(book);
                return self.fallback_decision("Daily budget exceeded", vec!["budget_constraint".to_string()]);
            }
        }

        let request_json = match serde_json::to_value(request) {
            Ok(value) => value,
            Err(_) => {
                return self.fallback_decision_tagged("error_fallback: request serialization failed");
            }
        };

        let decision = self
            .rules
            .iter()
            .find_map(|rule| self.try_rule(rule, &request_json, profile_id, prompt_len))
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|rule| rule.name == "default")
                    .map(|rule| self.decision_from_rule(rule, prompt_len, profile_id, vec![rule.name.clone()]))
            })
            .unwrap_or_else(|| self.fallback_decision("no rule matched", vec!["fallback".to_string()]));

        self.budget_book.lock().record(decision.estimated_cost);
        decision
    }

    fn try_rule(
        &self,
        rule: &RoutingRule,
        request_json: &serde_json::Value,
        profile_id: &str,
        prompt_len: usize,
    ) -> Option<RoutingDecision> {
        if !all_match(request_json, profile_id, &rule.conditions) {
            return None;
        }
        let candidate = self.decision_from_rule(rule, prompt_len, profile_id, vec![rule.name.clone()]);
        if candidate.estimated_cost > self.cost_constraints.per_request_max {
            return None;
        }
        Some(candidate)
    }

    fn decision_from_rule(
        &self,
        rule: &RoutingRule,
        prompt_len: usize,
        profile_id: &str,
        rules_applied: Vec<String>,
    ) -> RoutingDecision {
        let estimated_cost = base_cost(&rule.action.model, prompt_len, profile_id) * rule.action.cost_multiplier;
        let confidence_score = confidence(&rule.action.model, profile_id, prompt_len);
        RoutingDecision {
            provider_id: provider_id(&rule.action.provider),
            model_id: model_id(&rule.action.model),
            estimated_cost,
            expected_latency_ms: rule.action.max_latency_ms,
            confidence_score,
            reason: format!("matched rule {}", rule.name),
            rules_applied,
            fallback_provider: None,
        }
        .with_clamped_confidence()
    }

    fn fallback_decision(&self, reason: &str, rules_applied: Vec<String>) -> RoutingDecision {
        RoutingDecision {
            provider_id: provider_id(FALLBACK_PROVIDER),
            model_id: model_id(FALLBACK_MODEL),
            estimated_cost: FALLBACK_COST,
            expected_latency_ms: FALLBACK_LATENCY_MS,
            confidence_score: FALLBACK_CONFIDENCE,
            reason: reason.to_string(),
            rules_applied,
            fallback_provider: None,
        }
    }

    fn fallback_decision_tagged(&self, reason: &str) -> RoutingDecision {
        self.fallback_decision(reason, vec!["error_fallback".to_string()])
    }
}

fn provider_id(raw: &str) -> ProviderId {
    ProviderId::new(raw).unwrap_or_else(|_| ProviderId::new(FALLBACK_PROVIDER).expect("fallback provider id is valid"))
}

fn model_id(raw: &str) -> ModelId {
    ModelId::new(raw).unwrap_or_else(|_| ModelId::new(FALLBACK_MODEL).expect("fallback model id is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycore_core::request::AIRequestBuilder;

    fn engine_with(document: RuleDocument) -> SteeringEngine {
        SteeringEngine::from_document(PathBuf::from("test.yaml"), document).unwrap()
    }

    fn gpt4_automotive_document() -> RuleDocument {
        serde_yaml::from_str(
            r#"
routing_rules:
  - name: gpt4-rule
    priority: 10
    conditions:
      - field: profile
        operator: equals
        value: automotive
    action:
      provider: openai
      model: gpt-4
      cost_multiplier: 1.0
      max_latency_ms: 3000
cost_constraints:
  daily_budget: 1000.0
  per_request_max: 5.0
  emergency_threshold: 0.9
"#,
        )
        .unwrap()
    }

    #[test]
    fn scenario_one_rule_match_within_budget() {
        let engine = engine_with(gpt4_automotive_document());
        let request = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("automotive")
            .prompt("hi")
            .build()
            .unwrap();
        let decision = engine.decide(&request, "automotive");
        assert_eq!(decision.provider_id.as_str(), "openai");
        assert_eq!(decision.model_id.as_str(), "gpt-4");
        assert!((decision.estimated_cost - 0.000_054).abs() < 1e-9);
        assert_eq!(decision.rules_applied, vec!["gpt4-rule".to_string()]);
    }

    #[test]
    fn scenario_two_daily_cap_breached() {
        let engine = engine_with(gpt4_automotive_document());
        engine.budget_book.lock().record(1000.0);
        let request = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("automotive")
            .prompt("hi")
            .build()
            .unwrap();
        let decision = engine.decide(&request, "automotive");
        assert_eq!(decision.reason, "Daily budget exceeded");
        assert_eq!(decision.rules_applied, vec!["budget_constraint".to_string()]);
    }

    #[test]
    fn decide_is_deterministic_for_same_inputs() {
        let engine = engine_with(gpt4_automotive_document());
        let request = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("automotive")
            .prompt("hi")
            .build()
            .unwrap();
        engine.reset_budget_book();
        let first = engine.decide(&request, "automotive");
        engine.reset_budget_book();
        let second = engine.decide(&request, "automotive");
        assert_eq!(first.provider_id, second.provider_id);
        assert_eq!(first.model_id, second.model_id);
        assert!((first.estimated_cost - second.estimated_cost).abs() < 1e-12);
    }

    #[test]
    fn no_match_falls_back_to_fixed_decision() {
        let engine = engine_with(gpt4_automotive_document());
        let request = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("healthcare")
            .prompt("hi")
            .build()
            .unwrap();
        let decision = engine.decide(&request, "healthcare");
        assert_eq!(decision.provider_id.as_str(), FALLBACK_PROVIDER);
        assert_eq!(decision.model_id.as_str(), FALLBACK_MODEL);
    }

    #[test]
    fn over_per_request_max_skips_to_next_rule() {
        let mut document = gpt4_automotive_document();
        document.cost_constraints.per_request_max = 0.00001;
        let engine = engine_with(document);
        let request = AIRequestBuilder::new()
            .system_source("autmatrix")
            .requested_model("gpt-4")
            .routing_profile_id("automotive")
            .prompt("hi")
            .build()
            .unwrap();
        let decision = engine.decide(&request, "automotive");
        assert_eq!(decision.model_id.as_str(), FALLBACK_MODEL);
    }
}
