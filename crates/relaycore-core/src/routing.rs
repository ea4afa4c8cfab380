//! The output of the steering rules engine.

use serde::{Deserialize, Serialize};

use crate::ids::{ModelId, ProviderId};

/// The provider/model choice and reasoning produced for one [`crate::request::AIRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The chosen provider.
    pub provider_id: ProviderId,
    /// The chosen model.
    pub model_id: ModelId,
    /// Predicted cost in the provider's billing currency.
    pub estimated_cost: f64,
    /// Expected round-trip latency in milliseconds.
    pub expected_latency_ms: u32,
    /// Confidence in this decision, always within `[0, 1]`.
    pub confidence_score: f64,
    /// Human-readable explanation of why this decision was made.
    pub reason: String,
    /// Names of the rules that were evaluated to reach this decision, in
    /// evaluation order.
    pub rules_applied: Vec<String>,
    /// The provider to fail over to if the chosen provider's breaker is
    /// open or the call fails, if one is known.
    pub fallback_provider: Option<ProviderId>,
}

impl RoutingDecision {
    /// Clamp `confidence_score` into the valid `[0, 1]` range, guarding
    /// against a caller-constructed decision drifting outside the
    /// documented bounds.
    #[must_use]
    pub fn with_clamped_confidence(mut self) -> Self {
        self.confidence_score = self.confidence_score.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_confidence_into_unit_interval() {
        let provider = ProviderId::new("openai").unwrap();
        let model = ModelId::new("gpt-4").unwrap();
        let decision = RoutingDecision {
            provider_id: provider,
            model_id: model,
            estimated_cost: 0.01,
            expected_latency_ms: 1000,
            confidence_score: 1.4,
            reason: "test".into(),
            rules_applied: vec![],
            fallback_provider: None,
        }
        .with_clamped_confidence();
        assert!((decision.confidence_score - 1.0).abs() < f64::EPSILON);
    }
}
