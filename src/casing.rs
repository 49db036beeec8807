//! Key-casing translation between wire format and application format.
//!
//! The management API speaks `snake_case`; everything inside the console uses
//! `camelCase`. The request pipeline decamelizes outbound JSON bodies and
//! camelizes inbound ones, and the notice channel camelizes every pushed
//! record. Both directions walk a [`serde_json::Value`] tree and rewrite object
//! keys only, never values.
//!
//! Conversion is best-effort: numeric keys and keys containing anything other
//! than ASCII alphanumerics, `_` or `-` are left exactly as they are.

// Rust guideline compliant 2026-02

use serde_json::{Map, Value};

/// Returns `true` if `key` should pass through untouched.
fn is_opaque_key(key: &str) -> bool {
    key.is_empty()
        || key.parse::<f64>().is_ok()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Convert one key from `snake_case` (or `kebab-case`) to `camelCase`.
///
/// Runs of `_`/`-` are dropped and the character after them is upper-cased.
/// Leading separators are kept so `_private` stays distinguishable from
/// `private`. The first remaining character is lower-cased.
#[must_use]
pub fn camelize_key(key: &str) -> String {
    if is_opaque_key(key) {
        return key.to_string();
    }

    let body_start = key
        .find(|c: char| c != '_' && c != '-')
        .unwrap_or(key.len());
    let (prefix, body) = key.split_at(body_start);

    let mut out = String::with_capacity(key.len());
    out.push_str(prefix);

    let mut upper_next = false;
    let mut first = true;
    for c in body.chars() {
        if c == '_' || c == '-' {
            upper_next = true;
            continue;
        }
        if first {
            out.push(c.to_ascii_lowercase());
            first = false;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        upper_next = false;
    }
    out
}

/// Convert one key from `camelCase` to `snake_case`.
///
/// An `_` is inserted before every upper-case letter that is not the first
/// character, then the whole key is lower-cased.
#[must_use]
pub fn decamelize_key(key: &str) -> String {
    if is_opaque_key(key) {
        return key.to_string();
    }

    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Deep-convert every object key in `value` with `convert`.
fn transform_keys(value: Value, convert: &impl Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let converted: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (convert(&k), transform_keys(v, convert)))
                .collect();
            Value::Object(converted)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| transform_keys(v, convert))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Deep-convert all keys from wire casing to application casing.
#[must_use]
pub fn camelize_keys(value: Value) -> Value {
    transform_keys(value, &camelize_key)
}

/// Deep-convert all keys from application casing to wire casing.
#[must_use]
pub fn decamelize_keys(value: Value) -> Value {
    transform_keys(value, &decamelize_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camelize_key_basic() {
        assert_eq!(camelize_key("created_at"), "createdAt");
        assert_eq!(camelize_key("is_sys_admin"), "isSysAdmin");
        assert_eq!(camelize_key("id"), "id");
        assert_eq!(camelize_key("x-request-id"), "xRequestId");
    }

    #[test]
    fn test_camelize_key_lowercases_first_char() {
        assert_eq!(camelize_key("Namespace"), "namespace");
    }

    #[test]
    fn test_camelize_key_keeps_leading_underscores() {
        assert_eq!(camelize_key("_private_field"), "_privateField");
        assert_eq!(camelize_key("__typename"), "__typename");
    }

    #[test]
    fn test_decamelize_key_basic() {
        assert_eq!(decamelize_key("createdAt"), "created_at");
        assert_eq!(decamelize_key("isSysAdmin"), "is_sys_admin");
        assert_eq!(decamelize_key("userID"), "user_i_d");
        assert_eq!(decamelize_key("already_snake"), "already_snake");
    }

    #[test]
    fn test_opaque_keys_pass_through() {
        for key in ["123", "1.5", "", "10.0.0.1/24", "foo bar", "a.b", "ключ"] {
            assert_eq!(camelize_key(key), key, "camelize changed {key:?}");
            assert_eq!(decamelize_key(key), key, "decamelize changed {key:?}");
        }
    }

    #[test]
    fn test_keys_round_trip() {
        for key in ["createdAt", "userID", "ipv4Address", "id", "deviceCount", "a1B2"] {
            assert_eq!(camelize_key(&decamelize_key(key)), key);
        }
    }

    #[test]
    fn test_nested_objects_and_arrays_round_trip() {
        let app = json!({
            "tenantId": "t1",
            "userList": [
                {"displayName": "Ann", "logins": [{"loginId": "ann@x", "isPrimary": true}]},
                {"displayName": "Bob", "logins": []}
            ],
            "routeTable": {"nextHop": {"wgPeer": null}},
            "tags": ["keepThisValue", 1, false]
        });

        let wire = decamelize_keys(app.clone());
        assert_eq!(wire["tenant_id"], "t1");
        assert_eq!(wire["user_list"][0]["logins"][0]["login_id"], "ann@x");
        assert!(wire["route_table"]["next_hop"]
            .as_object()
            .expect("object")
            .contains_key("wg_peer"));
        // Values are never rewritten
        assert_eq!(wire["tags"][0], "keepThisValue");

        assert_eq!(camelize_keys(wire), app);
    }

    #[test]
    fn test_scalars_untouched() {
        assert_eq!(camelize_keys(json!("snake_value")), json!("snake_value"));
        assert_eq!(decamelize_keys(json!(42)), json!(42));
        assert_eq!(camelize_keys(Value::Null), Value::Null);
    }

    #[test]
    fn test_notice_record_example() {
        let wire = json!({"id": "n1", "created_at": "2024-01-01T00:00:00Z", "text": "hi"});
        let app = camelize_keys(wire);
        let keys: Vec<&str> = app
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert!(keys.contains(&"id"));
        assert!(keys.contains(&"createdAt"));
        assert!(keys.contains(&"text"));
        assert_eq!(app["createdAt"], "2024-01-01T00:00:00Z");
    }
}
