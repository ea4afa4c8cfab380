//! Types specific to the assembled pipeline: its response shape and the
//! per-request priority mapping.

use relaycore_core::{ModelId, ProviderId};
use relaycore_resilience::Priority;
use relaycore_telemetry::PerformanceSnapshot;
use serde_json::Value;

/// The pipeline's result for one request.
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    /// The provider that actually served the request (the primary unless
    /// failover kicked in).
    pub provider_id: ProviderId,
    /// The model that actually served the request (may differ from the
    /// request's `requested_model` if the optimizer substituted one).
    pub model_id: ModelId,
    /// The raw response body returned by the provider, or the cached body
    /// on a semantic cache hit.
    pub payload: Value,
    /// `true` when this response came from the semantic cache rather than
    /// a live provider call.
    pub cache_hit: bool,
    /// The cost estimate computed before dispatch.
    pub estimated_cost: f64,
    /// Per-stage timing for this request.
    pub performance: PerformanceSnapshot,
}

/// Map a caller's cost preference onto a dispatch priority. Not specified
/// by name anywhere upstream; a caller asking for the cheapest adequate
/// model is also content to wait longer, and a quality-first caller is
/// assumed latency-sensitive.
#[must_use]
pub fn priority_for(cost_preference: Option<relaycore_core::CostPreference>) -> Priority {
    use relaycore_core::CostPreference;
    match cost_preference {
        Some(CostPreference::QualityFirst) => Priority::High,
        Some(CostPreference::Aggressive) => Priority::Low,
        Some(CostPreference::Balanced) | None => Priority::Normal,
    }
}
