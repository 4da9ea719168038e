//! Redaction of caller-supplied audit details
//!
//! Every typed audit helper runs its `details` payload through
//! [`sanitize_for_log`] before the value is allowed into the trail, so a
//! careless call site cannot leak a raw secret into the append-only log.

use serde_json::Value;

/// Marker written in place of any redacted value
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Field names (lowercased, substring match) whose values are always redacted
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "card_number",
    "cardnumber",
    "cvv",
    "ssn",
    "pin",
    "api_key",
    "apikey",
    "authorization",
    "private_key",
    "credential",
];

/// Recursively redact known-sensitive fields from a JSON value
///
/// Object values under a sensitive key are replaced wholesale; scalar
/// strings that themselves contain "password" or "token" are also redacted,
/// catching secrets smuggled through free-text fields.
pub fn sanitize_for_log(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| {
                    if is_sensitive_key(&key) {
                        (key, Value::String(REDACTION_MARKER.to_string()))
                    } else {
                        (key, sanitize_for_log(inner))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_for_log).collect()),
        Value::String(s) if scalar_looks_sensitive(&s) => {
            Value::String(REDACTION_MARKER.to_string())
        }
        other => other,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| key.contains(needle))
}

fn scalar_looks_sensitive(value: &str) -> bool {
    let value = value.to_ascii_lowercase();
    value.contains("password") || value.contains("token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_keys_at_any_depth() {
        let sanitized = sanitize_for_log(json!({
            "order_id": 42,
            "password": "hunter2",
            "payment": {
                "cardNumber": "4111111111111111",
                "cvv": "123",
                "amount": "12.50"
            }
        }));

        assert_eq!(sanitized["order_id"], 42);
        assert_eq!(sanitized["password"], REDACTION_MARKER);
        assert_eq!(sanitized["payment"]["cardNumber"], REDACTION_MARKER);
        assert_eq!(sanitized["payment"]["cvv"], REDACTION_MARKER);
        assert_eq!(sanitized["payment"]["amount"], "12.50");
    }

    #[test]
    fn key_matching_is_case_insensitive_and_substring() {
        let sanitized = sanitize_for_log(json!({
            "UserPassword": "x",
            "refresh_token": "y",
            "session_api_key": "z"
        }));
        assert_eq!(sanitized["UserPassword"], REDACTION_MARKER);
        assert_eq!(sanitized["refresh_token"], REDACTION_MARKER);
        assert_eq!(sanitized["session_api_key"], REDACTION_MARKER);
    }

    #[test]
    fn sensitive_scalars_redacted_wholesale() {
        let sanitized = sanitize_for_log(json!({
            "note": "the password is swordfish",
            "clean": "just a lunch order"
        }));
        assert_eq!(sanitized["note"], REDACTION_MARKER);
        assert_eq!(sanitized["clean"], "just a lunch order");
    }

    #[test]
    fn arrays_are_walked() {
        let sanitized = sanitize_for_log(json!([
            {"token": "abc"},
            "bearer token xyz",
            17
        ]));
        assert_eq!(sanitized[0]["token"], REDACTION_MARKER);
        assert_eq!(sanitized[1], REDACTION_MARKER);
        assert_eq!(sanitized[2], 17);
    }

    #[test]
    fn non_sensitive_values_untouched() {
        let original = json!({"resource": "menu", "count": 3, "flag": true, "nothing": null});
        assert_eq!(sanitize_for_log(original.clone()), original);
    }
}
