//! Pure model-substitution logic: given a prediction and the caller's
//! remaining budget, decide whether to keep the requested model or
//! downgrade to a cheaper family member.

use crate::model_table::{alternatives_for, profile_for};
use crate::predictor::CostPrediction;

const SUBSTITUTION_THRESHOLD: f64 = 0.10;

/// The optimizer's recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedSelection {
    /// The model to actually use.
    pub model: String,
    /// `true` when this differs from the originally requested model.
    pub substituted: bool,
    /// Projected cost of `model` for this request, in USD.
    pub projected_cost: f64,
}

/// `optimizeModelSelection`: keep the requested model if its predicted
/// cost is within 10% of the remaining budget; otherwise substitute the
/// highest-performing same-family alternative that fits, falling back to
/// the cheapest alternative if none fit.
#[must_use]
pub fn optimize_model_selection(prediction: &CostPrediction, remaining_budget: f64) -> OptimizedSelection {
    let budget_ceiling = remaining_budget * SUBSTITUTION_THRESHOLD;

    if prediction.estimated_cost <= budget_ceiling {
        return OptimizedSelection {
            model: prediction.recommended_model.clone(),
            substituted: false,
            projected_cost: prediction.estimated_cost,
        };
    }

    let mut candidates: Vec<_> = alternatives_for(&prediction.recommended_model)
        .into_iter()
        .map(|profile| {
            let ratio = prediction.estimated_cost
                / profile_for(&prediction.recommended_model).base_rate_per_1k.max(f64::EPSILON);
            (profile, profile.base_rate_per_1k * ratio)
        })
        .collect();

    let affordable = candidates
        .iter()
        .filter(|(_, projected_cost)| *projected_cost <= budget_ceiling)
        .max_by(|(a, _), (b, _)| a.performance_score.partial_cmp(&b.performance_score).unwrap());

    if let Some((profile, projected_cost)) = affordable {
        return OptimizedSelection {
            model: profile.name.to_string(),
            substituted: true,
            projected_cost: *projected_cost,
        };
    }

    candidates.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap());
    candidates
        .into_iter()
        .next()
        .map_or_else(
            || OptimizedSelection {
                model: prediction.recommended_model.clone(),
                substituted: false,
                projected_cost: prediction.estimated_cost,
            },
            |(profile, projected_cost)| OptimizedSelection {
                model: profile.name.to_string(),
                substituted: true,
                projected_cost,
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(model: &str, cost: f64) -> CostPrediction {
        CostPrediction {
            estimated_cost: cost,
            confidence: 0.85,
            recommended_model: model.to_string(),
            alternative_models: vec![],
        }
    }

    #[test]
    fn keeps_model_when_within_ten_percent_of_remaining() {
        let result = optimize_model_selection(&prediction("gpt-4", 1.0), 20.0);
        assert!(!result.substituted);
        assert_eq!(result.model, "gpt-4");
    }

    #[test]
    fn substitutes_when_over_threshold() {
        let result = optimize_model_selection(&prediction("gpt-4", 5.0), 20.0);
        assert!(result.substituted);
        assert_ne!(result.model, "gpt-4");
    }

    #[test]
    fn falls_back_to_cheapest_when_nothing_fits() {
        let result = optimize_model_selection(&prediction("gpt-4", 1000.0), 1.0);
        assert!(result.substituted);
        assert_eq!(result.model, "gpt-3.5-turbo");
    }
}
