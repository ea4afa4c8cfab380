//! `RELAYCORE_*` environment variable overrides applied on top of the TOML
//! document, one field at a time so a deployment can override a single
//! knob without redeploying the whole file.

use crate::RelayConfig;

/// Apply every recognized `RELAYCORE_*` variable found in `vars` onto
/// `config`. Unrecognized variables and values that fail to parse for
/// their field's type are ignored — an override is best-effort, never a
/// second source of fatal startup errors.
pub fn apply_env_overrides(config: &mut RelayConfig, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        let Some(field) = key.strip_prefix("RELAYCORE_") else {
            continue;
        };
        apply_one(config, field, &value);
    }
}

fn apply_one(config: &mut RelayConfig, field: &str, value: &str) {
    match field {
        "STEERING_RULES_FILE" => config.steering.rules_file = value.to_string(),
        "STEERING_DAILY_BUDGET_USD" => {
            if let Ok(parsed) = value.parse() {
                config.steering.daily_budget_usd = parsed;
            }
        }
        "STEERING_PER_REQUEST_MAX_USD" => {
            if let Ok(parsed) = value.parse() {
                config.steering.per_request_max_usd = parsed;
            }
        }
        "QUEUE_MAX_SIZE" => {
            if let Ok(parsed) = value.parse() {
                config.queue.max_size = parsed;
            }
        }
        "QUEUE_TIMEOUT_MS" => {
            if let Ok(parsed) = value.parse() {
                config.queue.timeout_ms = parsed;
            }
        }
        "QUEUE_MAX_RETRIES" => {
            if let Ok(parsed) = value.parse() {
                config.queue.max_retries = parsed;
            }
        }
        "CIRCUIT_FAILURE_THRESHOLD" => {
            if let Ok(parsed) = value.parse() {
                config.circuit.failure_threshold = parsed;
            }
        }
        "CIRCUIT_RECOVERY_TIMEOUT_MS" => {
            if let Ok(parsed) = value.parse() {
                config.circuit.recovery_timeout_ms = parsed;
            }
        }
        "CACHE_TTL_SECONDS" => {
            if let Ok(parsed) = value.parse() {
                config.cache.ttl_seconds = parsed;
            }
        }
        "SEMANTIC_CACHE_ENABLED" => {
            if let Ok(parsed) = value.parse() {
                config.semantic_cache.enabled = parsed;
            }
        }
        "SEMANTIC_CACHE_SIMILARITY_THRESHOLD" => {
            if let Ok(parsed) = value.parse() {
                config.semantic_cache.similarity_threshold = parsed;
            }
        }
        "BUDGET_STATUS_CACHE_TTL_SEC" => {
            if let Ok(parsed) = value.parse() {
                config.budget.status_cache_ttl_sec = parsed;
            }
        }
        "TELEMETRY_FILTER" => config.telemetry.filter = value.to_string(),
        "INTEGRATIONS_NEUROWEAVER_BASE_URL" => config.integrations.neuroweaver_base_url = value.to_string(),
        "INTEGRATIONS_EMBEDDINGS_BASE_URL" => config.integrations.embeddings_base_url = value.to_string(),
        "INTEGRATIONS_DISTRIBUTED_KV_BASE_URL" => config.integrations.distributed_kv_base_url = value.to_string(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_known_field() {
        let mut config = RelayConfig::default();
        let vars = vec![("RELAYCORE_QUEUE_MAX_SIZE".to_string(), "42".to_string())];
        apply_env_overrides(&mut config, vars.into_iter());
        assert_eq!(config.queue.max_size, 42);
    }

    #[test]
    fn ignores_unknown_field_and_bad_value() {
        let mut config = RelayConfig::default();
        let vars = vec![
            ("RELAYCORE_NOT_A_FIELD".to_string(), "x".to_string()),
            ("RELAYCORE_QUEUE_MAX_SIZE".to_string(), "not-a-number".to_string()),
            ("OTHER_PREFIX_QUEUE_MAX_SIZE".to_string(), "7".to_string()),
        ];
        apply_env_overrides(&mut config, vars.into_iter());
        assert_eq!(config.queue.max_size, 1000);
    }
}
