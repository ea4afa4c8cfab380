//! Condition evaluation: dotted field-path traversal over a JSON view of
//! the request, plus the virtual `profile` field.

use serde_json::Value;

use crate::types::{Condition, ConditionOperator};

/// Resolve a dotted field path (`"context.user.tier"`) against a JSON
/// object, returning `None` when any segment is missing rather than
/// treating a missing field as a match.
fn resolve_field<'a>(root: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in field.split('.') {
        current = current.as_object()?.get(segment)?;
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

fn value_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

fn value_as_comparable_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate one condition against `request_json` (the request serialized
/// to a generic JSON tree) and the active `profile_id`.
///
/// `"profile"` is a virtual field compared directly against `profile_id`
/// rather than resolved through `request_json`.
#[must_use]
pub fn evaluate_condition(request_json: &Value, profile_id: &str, condition: &Condition) -> bool {
    if condition.field == "profile" {
        return evaluate_profile(profile_id, condition);
    }

    let resolved = resolve_field(request_json, &condition.field);

    match condition.operator {
        ConditionOperator::Exists => {
            let expects_presence = condition.value.as_bool().unwrap_or(true);
            resolved.is_some() == expects_presence
        }
        ConditionOperator::Equals => match resolved {
            Some(actual) => values_equal(actual, &condition.value),
            None => false,
        },
        ConditionOperator::Contains => match resolved {
            Some(actual) => {
                value_as_comparable_string(actual).contains(&value_as_comparable_string(&condition.value))
            }
            None => false,
        },
        ConditionOperator::LengthLessThan => match (resolved.and_then(value_len), condition.value.as_f64())
        {
            (Some(len), Some(bound)) => (len as f64) < bound,
            _ => false,
        },
        ConditionOperator::LengthGreaterThan => {
            match (resolved.and_then(value_len), condition.value.as_f64()) {
                (Some(len), Some(bound)) => (len as f64) > bound,
                _ => false,
            }
        }
    }
}

fn evaluate_profile(profile_id: &str, condition: &Condition) -> bool {
    match condition.operator {
        ConditionOperator::Exists => {
            condition.value.as_bool().unwrap_or(true) == !profile_id.is_empty()
        }
        ConditionOperator::Equals => condition.value.as_str() == Some(profile_id),
        ConditionOperator::Contains => {
            profile_id.contains(&value_as_comparable_string(&condition.value))
        }
        ConditionOperator::LengthLessThan => condition
            .value
            .as_f64()
            .is_some_and(|bound| (profile_id.chars().count() as f64) < bound),
        ConditionOperator::LengthGreaterThan => condition
            .value
            .as_f64()
            .is_some_and(|bound| (profile_id.chars().count() as f64) > bound),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    value_as_comparable_string(actual) == value_as_comparable_string(expected)
}

/// True when every condition in `conditions` matches.
#[must_use]
pub fn all_match(request_json: &Value, profile_id: &str, conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .all(|condition| evaluate_condition(request_json, profile_id, condition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(field: &str, operator: ConditionOperator, value: Value) -> Condition {
        Condition {
            field: field.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn profile_equals_matches_profile_id() {
        let request = json!({});
        let cond = condition("profile", ConditionOperator::Equals, json!("automotive"));
        assert!(evaluate_condition(&request, "automotive", &cond));
        assert!(!evaluate_condition(&request, "healthcare", &cond));
    }

    #[test]
    fn missing_field_is_false_except_exists_false() {
        let request = json!({"prompt": "hi"});
        let exists_false = condition("context.user.tier", ConditionOperator::Exists, json!(false));
        let equals = condition("context.user.tier", ConditionOperator::Equals, json!("gold"));
        assert!(evaluate_condition(&request, "default", &exists_false));
        assert!(!evaluate_condition(&request, "default", &equals));
    }

    #[test]
    fn length_operators_use_char_count() {
        let request = json!({"prompt": "hello"});
        let less = condition("prompt", ConditionOperator::LengthLessThan, json!(10));
        let greater = condition("prompt", ConditionOperator::LengthGreaterThan, json!(10));
        assert!(evaluate_condition(&request, "default", &less));
        assert!(!evaluate_condition(&request, "default", &greater));
    }

    #[test]
    fn contains_matches_substring() {
        let request = json!({"prompt": "please help me debug this"});
        let cond = condition("prompt", ConditionOperator::Contains, json!("debug"));
        assert!(evaluate_condition(&request, "default", &cond));
    }

    #[test]
    fn nested_dotted_path_resolves() {
        let request = json!({"context": {"user": {"tier": "gold"}}});
        let cond = condition("context.user.tier", ConditionOperator::Equals, json!("gold"));
        assert!(evaluate_condition(&request, "default", &cond));
    }
}
