//! Static per-model reference data: the fallback blended cost rate, the
//! output/input token ratio, and the performance/latency constants the
//! optimizer compares alternatives with.

/// One entry of the static model reference table.
#[derive(Debug, Clone, Copy)]
pub struct ModelProfile {
    /// Model name (matched by substring against a request's model field).
    pub name: &'static str,
    /// The model family this belongs to, used to find substitution
    /// candidates.
    pub family: &'static str,
    /// Fallback blended cost per 1000 tokens, in USD, used before an EMA
    /// has accumulated enough samples.
    pub base_rate_per_1k: f64,
    /// Output tokens generated per input token, absent an explicit
    /// `max_tokens`.
    pub output_ratio: f64,
    /// Constant relative performance score in `[0, 1]`, higher is better.
    pub performance_score: f64,
    /// Constant expected latency, in milliseconds.
    pub latency_ms: u32,
}

/// The static table. Ordered roughly by capability/cost tier within each
/// family so [`alternatives_for`] returns substitution candidates in a
/// stable order.
pub const MODEL_TABLE: &[ModelProfile] = &[
    ModelProfile {
        name: "gpt-4",
        family: "openai",
        base_rate_per_1k: 0.03,
        output_ratio: 1.2,
        performance_score: 0.95,
        latency_ms: 3000,
    },
    ModelProfile {
        name: "gpt-3.5-turbo",
        family: "openai",
        base_rate_per_1k: 0.002,
        output_ratio: 1.5,
        performance_score: 0.75,
        latency_ms: 1200,
    },
    ModelProfile {
        name: "claude-3-opus",
        family: "anthropic",
        base_rate_per_1k: 0.024,
        output_ratio: 1.3,
        performance_score: 0.93,
        latency_ms: 2800,
    },
    ModelProfile {
        name: "claude-3-haiku",
        family: "anthropic",
        base_rate_per_1k: 0.0025,
        output_ratio: 1.3,
        performance_score: 0.78,
        latency_ms: 900,
    },
    ModelProfile {
        name: "llama",
        family: "open-source",
        base_rate_per_1k: 0.001,
        output_ratio: 1.4,
        performance_score: 0.65,
        latency_ms: 1500,
    },
    ModelProfile {
        name: "mistral",
        family: "open-source",
        base_rate_per_1k: 0.0015,
        output_ratio: 1.3,
        performance_score: 0.68,
        latency_ms: 1100,
    },
    ModelProfile {
        name: "gemini",
        family: "google",
        base_rate_per_1k: 0.0125,
        output_ratio: 1.2,
        performance_score: 0.88,
        latency_ms: 2000,
    },
];

const DEFAULT_PROFILE: ModelProfile = ModelProfile {
    name: "unknown",
    family: "unknown",
    base_rate_per_1k: 0.01,
    output_ratio: 1.0,
    performance_score: 0.7,
    latency_ms: 2000,
};

/// Look up the profile matching `model`, falling back to a conservative
/// default for unrecognized names.
#[must_use]
pub fn profile_for(model: &str) -> ModelProfile {
    MODEL_TABLE
        .iter()
        .find(|profile| model.contains(profile.name))
        .copied()
        .unwrap_or(DEFAULT_PROFILE)
}

/// The output/input token ratio for `model`.
#[must_use]
pub fn output_ratio(model: &str) -> f64 {
    profile_for(model).output_ratio
}

/// Every other model in the same family as `model`, excluding `model`
/// itself, ordered by the table's declaration order.
#[must_use]
pub fn alternatives_for(model: &str) -> Vec<ModelProfile> {
    let family = profile_for(model).family;
    MODEL_TABLE
        .iter()
        .filter(|profile| profile.family == family && !model.contains(profile.name))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default_profile() {
        let profile = profile_for("some-future-model");
        assert_eq!(profile.name, "unknown");
    }

    #[test]
    fn alternatives_stay_within_family() {
        let alternatives = alternatives_for("gpt-4");
        assert!(alternatives.iter().all(|profile| profile.family == "openai"));
        assert!(alternatives.iter().any(|profile| profile.name == "gpt-3.5-turbo"));
    }
}
