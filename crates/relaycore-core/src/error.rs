//! The `RelayError` taxonomy shared across every subsystem.
//!
//! One variant per error kind named in the pipeline's error handling design.
//! Each variant carries the `{ kind, message, details }` shape so a caller at
//! the edge of the system can render a stable, user-visible failure without
//! reaching into subsystem internals.

use thiserror::Error;

use crate::ids::{ProviderId, ScopeId};

/// Structured failure details attached to a [`RelayError`], populated only
/// where the originating subsystem has something concrete to say.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDetails {
    /// Budget the failure relates to, if any.
    pub budget_id: Option<String>,
    /// Providers already attempted before this error was raised.
    pub attempted_providers: Vec<ProviderId>,
    /// Actions the caller may take to resolve a budget-constraint failure.
    pub suggested_actions: Vec<String>,
}

impl ErrorDetails {
    /// An empty details payload.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Attach a budget id.
    #[must_use]
    pub fn with_budget(mut self, budget_id: impl Into<String>) -> Self {
        self.budget_id = Some(budget_id.into());
        self
    }

    /// Attach the providers attempted so far.
    #[must_use]
    pub fn with_attempted_providers(mut self, providers: Vec<ProviderId>) -> Self {
        self.attempted_providers = providers;
        self
    }

    /// Attach suggested remediation actions.
    #[must_use]
    pub fn with_suggested_actions(mut self, actions: Vec<String>) -> Self {
        self.suggested_actions = actions;
        self
    }
}

/// The top-level error type every RelayCore subsystem ultimately surfaces.
///
/// Retried errors (`ProviderTimeout`, `ProviderFailure`, a single
/// `TransientStoreError` retry) are internal to the resilience layer and
/// are not expected to reach a caller unless retries are exhausted.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The rule file or a configuration document failed validation. Fatal
    /// at startup.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable description of what is wrong.
        message: String,
    },

    /// A budget id referenced by a caller does not exist.
    #[error("budget not found: {message}")]
    BudgetNotFound {
        /// Human-readable description.
        message: String,
        /// Structured details.
        details: ErrorDetails,
    },

    /// A budget constraint check forbids the request from proceeding.
    #[error("budget exceeded: {message}")]
    BudgetExceeded {
        /// Human-readable description.
        message: String,
        /// Structured details, typically including `suggested_actions`.
        details: ErrorDetails,
    },

    /// The priority queue rejected an enqueue because it is at capacity.
    #[error("queue full: {message}")]
    QueueFull {
        /// Human-readable description.
        message: String,
    },

    /// A provider call exceeded its allotted timeout inside a circuit
    /// breaker. Counted as a failure and retried by the caller.
    #[error("provider timeout: {message}")]
    ProviderTimeout {
        /// Human-readable description.
        message: String,
        /// Structured details, typically including `attempted_providers`.
        details: ErrorDetails,
    },

    /// A provider call failed for a reason other than timeout. Counted as a
    /// failure and retried by the caller.
    #[error("provider failure: {message}")]
    ProviderFailure {
        /// Human-readable description.
        message: String,
        /// Structured details, typically including `attempted_providers`.
        details: ErrorDetails,
    },

    /// A circuit breaker rejected the request because it is open. Triggers
    /// failover; final only if no failover candidate succeeds.
    #[error("circuit open for provider {provider}")]
    CircuitOpen {
        /// The provider whose breaker rejected the call.
        provider: ProviderId,
    },

    /// The primary provider and every failover candidate failed.
    #[error("all providers failed: {message}")]
    AllProvidersFailed {
        /// Human-readable aggregate description.
        message: String,
        /// Structured details, including every provider attempted.
        details: ErrorDetails,
    },

    /// The relational store or distributed KV is unavailable. Retried once
    /// locally; degrades to a local-only path where one exists.
    #[error("transient store error: {message}")]
    TransientStoreError {
        /// Human-readable description.
        message: String,
    },

    /// The caller's cancellation token was observed before completion.
    #[error("operation cancelled: {message}")]
    Cancelled {
        /// Human-readable description.
        message: String,
    },

    /// Catch-all for unexpected internal failures that don't fit a named
    /// kind above.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl RelayError {
    /// The stable error kind name, matching the table in the error handling
    /// design (used for the `kind` field of the user-visible failure shape).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "InvalidConfig",
            Self::BudgetNotFound { .. } => "BudgetNotFound",
            Self::BudgetExceeded { .. } => "BudgetExceeded",
            Self::QueueFull { .. } => "QueueFull",
            Self::ProviderTimeout { .. } => "ProviderTimeout",
            Self::ProviderFailure { .. } => "ProviderFailure",
            Self::CircuitOpen { .. } => "CircuitOpen",
            Self::AllProvidersFailed { .. } => "AllProvidersFailed",
            Self::TransientStoreError { .. } => "TransientStoreError",
            Self::Cancelled { .. } => "Cancelled",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Structured details for this error, if any were attached.
    #[must_use]
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::BudgetNotFound { details, .. }
            | Self::BudgetExceeded { details, .. }
            | Self::ProviderTimeout { details, .. }
            | Self::ProviderFailure { details, .. }
            | Self::AllProvidersFailed { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Build an [`Self::InvalidConfig`] error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Build a [`Self::BudgetNotFound`] error.
    pub fn budget_not_found(scope: &ScopeId) -> Self {
        Self::BudgetNotFound {
            message: format!("no budget found for scope {scope}"),
            details: ErrorDetails::none(),
        }
    }

    /// Build a [`Self::BudgetExceeded`] error carrying suggested actions.
    pub fn budget_exceeded(
        budget_id: impl Into<String>,
        message: impl Into<String>,
        suggested_actions: Vec<String>,
    ) -> Self {
        Self::BudgetExceeded {
            message: message.into(),
            details: ErrorDetails::none()
                .with_budget(budget_id)
                .with_suggested_actions(suggested_actions),
        }
    }

    /// Build a [`Self::ProviderFailure`] error, attaching `provider` as the
    /// sole attempted provider.
    pub fn provider_failure(provider: ProviderId, message: impl Into<String>) -> Self {
        Self::ProviderFailure {
            message: message.into(),
            details: ErrorDetails::none().with_attempted_providers(vec![provider]),
        }
    }

    /// Build a [`Self::QueueFull`] error.
    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::QueueFull {
            message: message.into(),
        }
    }

    /// Build a [`Self::CircuitOpen`] error for the given provider.
    #[must_use]
    pub const fn circuit_open(provider: ProviderId) -> Self {
        Self::CircuitOpen { provider }
    }

    /// Build an [`Self::AllProvidersFailed`] error.
    pub fn all_providers_failed(attempted: Vec<ProviderId>) -> Self {
        Self::AllProvidersFailed {
            message: format!("all {} provider(s) failed", attempted.len()),
            details: ErrorDetails::none().with_attempted_providers(attempted),
        }
    }

    /// Build a [`Self::TransientStoreError`] error.
    pub fn transient_store(message: impl Into<String>) -> Self {
        Self::TransientStoreError {
            message: message.into(),
        }
    }

    /// Build a [`Self::Cancelled`] error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Build an [`Self::Internal`] error from an arbitrary source.
    pub fn internal(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for errors the resilience layer should count as a retryable
    /// failure (timeouts and non-timeout provider failures).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTimeout { .. } | Self::ProviderFailure { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = RelayError::invalid_config("bad rule file");
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn budget_exceeded_carries_details() {
        let err = RelayError::budget_exceeded("b1", "over limit", vec!["block-all".into()]);
        let details = err.details().expect("details present");
        assert_eq!(details.budget_id.as_deref(), Some("b1"));
        assert_eq!(details.suggested_actions, vec!["block-all".to_string()]);
    }

    #[test]
    fn provider_errors_are_retryable() {
        let timeout = RelayError::ProviderTimeout {
            message: "slow".into(),
            details: ErrorDetails::none(),
        };
        let cancelled = RelayError::cancelled("client hung up");
        assert!(timeout.is_retryable());
        assert!(!cancelled.is_retryable());
    }
}
