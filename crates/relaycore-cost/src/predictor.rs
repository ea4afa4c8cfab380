//! Pre-flight cost estimation with a per-model EMA of recent actual costs
//! and a rolling 7-day accuracy-derived confidence.

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use relaycore_core::AIRequest;

use crate::model_table::{alternatives_for, profile_for};

const EMA_ALPHA: f64 = 0.2;
const DEFAULT_CONFIDENCE: f64 = 0.85;
const ACCURACY_WINDOW_DAYS: i64 = 7;
const MAX_ACCURACY_SAMPLES: usize = 500;

/// The result of [`CostPredictor::predict_cost`].
#[derive(Debug, Clone)]
pub struct CostPrediction {
    /// Estimated total cost in USD.
    pub estimated_cost: f64,
    /// Confidence in the estimate, in `[0, 1]`.
    pub confidence: f64,
    /// The model the request asked for (predictions are always computed
    /// for the requested model; substitution is [`crate::optimizer`]'s
    /// job).
    pub recommended_model: String,
    /// Other models in the same family, cheapest-appropriate-first, that
    /// the optimizer may consider substituting.
    pub alternative_models: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct AccuracySample {
    recorded_at: DateTime<Utc>,
    error_fraction: f64,
}

#[derive(Debug, Default)]
struct ModelCostState {
    ema_cost_per_1k: Option<f64>,
    accuracy_samples: VecDeque<AccuracySample>,
}

/// Token-count estimate: `ceil(charLen / 4)` input tokens, output tokens
/// from an explicit cap or `inputTokens * outputRatio(model)`.
#[must_use]
pub fn estimate_tokens(prompt_char_len: usize, max_tokens: Option<u32>, model: &str) -> (u64, u64) {
    let input_tokens = (prompt_char_len as f64 / 4.0).ceil() as u64;
    let output_tokens = max_tokens.map_or_else(
        || (input_tokens as f64 * profile_for(model).output_ratio).ceil() as u64,
        u64::from,
    );
    (input_tokens, output_tokens)
}

/// Tracks per-model EMA cost and rolling prediction accuracy. Cheap to
/// clone (backed by `Arc`-free `DashMap`, so share behind an `Arc` from
/// the pipeline assembler instead).
#[derive(Debug, Default)]
pub struct CostPredictor {
    models: DashMap<String, ModelCostState>,
}

impl CostPredictor {
    /// Construct a predictor with no accumulated history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the cost of serving `request` against its requested
    /// model.
    #[must_use]
    pub fn predict_cost(&self, request: &AIRequest) -> CostPrediction {
        let model = request.requested_model.as_str();
        let (input_tokens, output_tokens) = estimate_tokens(request.prompt_char_len(), request.max_tokens, model);
        let rate_per_1k = self.effective_rate(model);

        // Input/output split: 0.5x/1.5x of the blended per-token rate.
        let input_rate = rate_per_1k * 0.5;
        let output_rate = rate_per_1k * 1.5;
        let estimated_cost =
            (input_tokens as f64 / 1000.0) * input_rate + (output_tokens as f64 / 1000.0) * output_rate;

        CostPrediction {
            estimated_cost,
            confidence: self.confidence_for(model),
            recommended_model: model.to_string(),
            alternative_models: alternatives_for(model)
                .into_iter()
                .map(|profile| profile.name.to_string())
                .collect(),
        }
    }

    fn effective_rate(&self, model: &str) -> f64 {
        self.models
            .get(model)
            .and_then(|state| state.ema_cost_per_1k)
            .unwrap_or_else(|| profile_for(model).base_rate_per_1k)
    }

    fn confidence_for(&self, model: &str) -> f64 {
        let Some(state) = self.models.get(model) else {
            return DEFAULT_CONFIDENCE;
        };
        let cutoff = Utc::now() - ChronoDuration::days(ACCURACY_WINDOW_DAYS);
        let recent: Vec<_> = state
            .accuracy_samples
            .iter()
            .filter(|sample| sample.recorded_at >= cutoff)
            .collect();
        if recent.is_empty() {
            return DEFAULT_CONFIDENCE;
        }
        let mean_error = recent.iter().map(|sample| sample.error_fraction).sum::<f64>() / recent.len() as f64;
        (1.0 - mean_error).clamp(0.0, 1.0)
    }

    /// Feed back an observed actual cost for `model`, updating the EMA
    /// (`alpha = 0.2`) and the rolling accuracy window against the cost
    /// that had been predicted for this same call.
    pub fn update_model(&self, model: &str, predicted_cost: f64, actual_cost: f64, observed_tokens: u64) {
        let actual_rate_per_1k = if observed_tokens == 0 {
            return;
        } else {
            actual_cost / (observed_tokens as f64 / 1000.0)
        };

        let mut state = self.models.entry(model.to_string()).or_default();
        state.ema_cost_per_1k = Some(match state.ema_cost_per_1k {
            Some(prev) => EMA_ALPHA * actual_rate_per_1k + (1.0 - EMA_ALPHA) * prev,
            None => actual_rate_per_1k,
        });

        let error_fraction = if actual_cost > 0.0 {
            ((actual_cost - predicted_cost) / actual_cost).abs()
        } else {
            0.0
        };
        state.accuracy_samples.push_back(AccuracySample {
            recorded_at: Utc::now(),
            error_fraction,
        });
        if state.accuracy_samples.len() > MAX_ACCURACY_SAMPLES {
            state.accuracy_samples.pop_front();
        }
    }
}
