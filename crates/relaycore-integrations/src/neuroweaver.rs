//! Outbound client for NeuroWeaver, the external ML-tuning service that
//! reports per-model health and may receive routing feedback. Every call
//! is fire-and-forget from the core's perspective: failures are logged and
//! never propagate past this module.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-model performance feedback reported after serving a request.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceFeedback {
    /// Observed accuracy, in `[0, 1]`, if known.
    pub accuracy: Option<f64>,
    /// Observed latency, in milliseconds.
    pub latency_ms: u64,
    /// Observed throughput, in tokens per second, if known.
    pub throughput: Option<f64>,
    /// Actual cost incurred, in USD.
    pub cost: f64,
}

/// How urgently a model-switch recommendation should be applied.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchType {
    /// Apply on the very next request.
    Immediate,
    /// Ramp traffic over to the target model gradually.
    Gradual,
}

/// A request to switch a model's routing treatment.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSwitchRequest {
    /// The model currently in use.
    pub current_model: String,
    /// The model being proposed, if any.
    pub target_model: Option<String>,
    /// Why the switch is being proposed.
    pub reason: String,
    /// How urgently to apply it.
    pub switch_type: SwitchType,
}

/// NeuroWeaver's reported health for a single model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelHealth {
    /// The model this health report describes.
    pub model_id: String,
    /// Overall health score in `[0, 1]`.
    pub health_score: f64,
    /// Whether NeuroWeaver currently recommends this model for new
    /// traffic.
    pub recommended: bool,
}

/// Per-model alerting thresholds, settable via [`NeuroWeaverClient::set_thresholds`].
#[derive(Debug, Clone, Serialize)]
pub struct ModelThresholds {
    /// Minimum acceptable accuracy before NeuroWeaver flags the model.
    pub min_accuracy: f64,
    /// Maximum acceptable latency, in milliseconds.
    pub max_latency_ms: u64,
}

/// A thin HTTP client for NeuroWeaver's four operations. Every method
/// swallows its own errors: this integration is advisory, and a flaky
/// tuning service must never affect request serving.
pub struct NeuroWeaverClient {
    http: reqwest::Client,
    base_url: String,
}

impl NeuroWeaverClient {
    /// Construct a client pointed at `base_url` (e.g.
    /// `https://neuroweaver.internal`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Report per-model performance feedback. Logged on failure, never
    /// returned to the caller.
    pub async fn report_performance(&self, model_id: &str, feedback: &PerformanceFeedback) {
        let url = format!("{}/models/{}/feedback", self.base_url, model_id);
        if let Err(err) = self.http.post(&url).json(feedback).send().await {
            warn!(%model_id, error = %err, "failed to report performance feedback to NeuroWeaver");
        }
    }

    /// Propose a model switch. Logged on failure, never returned to the
    /// caller.
    pub async fn request_model_switch(&self, request: &ModelSwitchRequest) {
        let url = format!("{}/models/switch", self.base_url);
        if let Err(err) = self.http.post(&url).json(request).send().await {
            warn!(error = %err, "failed to submit model switch request to NeuroWeaver");
        }
    }

    /// Fetch NeuroWeaver's current health report for `model_id`. Returns
    /// `None` on any failure rather than propagating an error — callers
    /// should treat a missing report the same as "unknown, proceed
    /// normally".
    pub async fn get_model_health(&self, model_id: &str) -> Option<ModelHealth> {
        let url = format!("{}/models/{}/health", self.base_url, model_id);
        match self.http.get(&url).send().await {
            Ok(response) => response.json::<ModelHealth>().await.ok(),
            Err(err) => {
                warn!(%model_id, error = %err, "failed to fetch model health from NeuroWeaver");
                None
            }
        }
    }

    /// Update NeuroWeaver's alerting thresholds for `model_id`. Logged on
    /// failure, never returned to the caller.
    pub async fn set_thresholds(&self, model_id: &str, thresholds: &ModelThresholds) {
        let url = format!("{}/models/{}/thresholds", self.base_url, model_id);
        if let Err(err) = self.http.put(&url).json(thresholds).send().await {
            warn!(%model_id, error = %err, "failed to set model thresholds on NeuroWeaver");
        }
    }
}
