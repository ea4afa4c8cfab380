//! Pure cost/confidence math, factored out of the engine so it can be
//! property-tested without constructing a full rule set.

/// Per-1000-characters base rate, matched by substring against the model
/// name (first match wins, checked in this order).
const RATE_TABLE: &[(&str, f64)] = &[
    ("gpt-4", 0.03),
    ("gpt-3.5", 0.002),
    ("claude", 0.024),
    ("specialist", 0.015),
    ("llama", 0.001),
    ("mistral", 0.0015),
    ("gemini", 0.0125),
];

const DEFAULT_RATE: f64 = 0.01;

fn rate_for_model(model: &str) -> f64 {
    RATE_TABLE
        .iter()
        .find(|(needle, _)| model.contains(needle))
        .map_or(DEFAULT_RATE, |(_, rate)| *rate)
}

/// `baseCost(model, promptLength, profileId)`: per-1000-character rate for
/// the model, scaled by prompt length, with a flat 10% discount for the
/// `automotive` profile.
#[must_use]
pub fn base_cost(model: &str, prompt_len: usize, profile_id: &str) -> f64 {
    let rate = rate_for_model(model);
    let mut cost = rate * (prompt_len as f64) / 1000.0;
    if profile_id == "automotive" {
        cost *= 0.9;
    }
    cost
}

/// Confidence score for a matched decision: starts at 0.8, with additive
/// bumps for favorable signals and a penalty for long prompts, clamped to
/// `[0.5, 0.95]`.
#[must_use]
pub fn confidence(model: &str, profile_id: &str, prompt_len: usize) -> f64 {
    let mut score: f64 = 0.8;
    if model.contains("gpt-4") {
        score += 0.10;
    }
    if model.contains("specialist") {
        score += 0.05;
    }
    if profile_id == "healthcare" {
        score += 0.05;
    }
    if prompt_len > 1000 {
        score -= 0.05;
    }
    score.clamp(0.5, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_one_base_cost_matches_spec_example() {
        let cost = base_cost("gpt-4", 2, "automotive");
        assert!((cost - 0.000_054).abs() < 1e-9);
    }

    #[test]
    fn automotive_discount_only_applies_to_automotive() {
        let discounted = base_cost("gpt-4", 2, "automotive");
        let full = base_cost("gpt-4", 2, "healthcare");
        assert!(discounted < full);
    }

    #[test]
    fn confidence_is_always_clamped() {
        let high = confidence("gpt-4-specialist", "healthcare", 5);
        let low = confidence("llama", "default", 5000);
        assert!(high <= 0.95);
        assert!(low >= 0.5);
    }
}
