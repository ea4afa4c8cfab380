//! `tracing`/`tracing-subscriber` wiring, explicit and idempotent-on-error
//! rather than run implicitly at module load.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

/// How the process should emit its structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// Newline-delimited JSON, for ingestion by a log pipeline.
    Json,
}

/// Logging configuration consumed by [`init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `RUST_LOG`-style directive string, e.g. `"relaycore=info,warn"`.
    pub filter: String,
    /// Output encoding.
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Install the global `tracing` subscriber. Must be called exactly once,
/// by the binary's `main`, before any subsystem is constructed.
///
/// Returns an error string rather than panicking if a global subscriber is
/// already installed, so callers (including tests that need their own
/// scoped subscriber) can decide how to react.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_new(&config.filter)
        .map_err(|err| format!("invalid tracing filter {:?}: {err}", config.filter))?;

    let result = match config.format {
        LogFormat::Pretty => fmt().with_env_filter(env_filter).try_init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).try_init(),
    };

    result.map_err(|err| format!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let config = TelemetryConfig::default();
        assert!(EnvFilter::try_new(&config.filter).is_ok());
    }

    #[test]
    fn rejects_malformed_filter() {
        let config = TelemetryConfig {
            filter: "((not a filter".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(init_tracing(&config).is_err());
    }
}
