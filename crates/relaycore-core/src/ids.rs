//! Validated newtype identifiers.
//!
//! These wrap plain strings/UUIDs so that a provider id can never be
//! silently swapped for a model id at a call site — the compiler catches
//! it instead of a routing bug surfacing at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelayError;

/// Unique identifier for an incoming request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string (e.g. one supplied by a caller).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

macro_rules! string_id {
    ($name:ident, $label:literal) => {
        #[doc = concat!("Validated, non-empty ", $label, " identifier.")]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier string.
            ///
            /// # Errors
            /// Returns [`RelayError::InvalidConfig`] if the identifier is empty.
            pub fn new(id: impl Into<String>) -> Result<Self, RelayError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(RelayError::invalid_config(format!(
                        "{} cannot be empty",
                        $label
                    )));
                }
                Ok(Self(id))
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

string_id!(ProviderId, "provider id");
string_id!(ModelId, "model id");
string_id!(UserId, "user id");
string_id!(TeamId, "team id");
string_id!(ProjectId, "project id");

/// Scope identifier for the budget hierarchy: a user, team, organization, or
/// project. Distinct from the individual scope newtypes above because a
/// [`crate::request::AIRequest`] only ever carries one or two of them, while
/// the budget registry needs to name an arbitrary scope subject uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
    /// Wrap a raw scope subject id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&UserId> for ScopeId {
    fn from(value: &UserId) -> Self {
        Self::new(value.as_str())
    }
}

impl From<&TeamId> for ScopeId {
    fn from(value: &TeamId) -> Self {
        Self::new(value.as_str())
    }
}

impl From<&ProjectId> for ScopeId {
    fn from(value: &ProjectId) -> Self {
        Self::new(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_generates_unique_values() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }

    #[test]
    fn provider_id_rejects_empty() {
        assert!(ProviderId::new("").is_err());
        assert!(ProviderId::new("   ").is_err());
        assert!(ProviderId::new("openai").is_ok());
    }

    #[test]
    fn scope_id_from_user_id() {
        let user = UserId::new("u1").unwrap();
        let scope: ScopeId = (&user).into();
        assert_eq!(scope.as_str(), "u1");
    }
}
