//! Body transforms applied to every request and response.
//!
//! Outbound JSON bodies are decamelized, inbound JSON bodies camelized.
//! Anything that is not JSON passes through untouched.

use serde_json::Value;

use crate::casing::{camelize_keys, decamelize_keys};

/// Returns `true` if `content_type` names JSON, ignoring parameters such as
/// `charset`.
#[must_use]
pub fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

/// Rewrite an outbound body for the wire.
///
/// JSON bodies have their keys converted to `snake_case`. A body that claims
/// to be JSON but does not parse is sent as-is.
#[must_use]
pub fn encode_request_body(content_type: Option<&str>, body: Vec<u8>) -> Vec<u8> {
    if body.is_empty() || !is_json(content_type) {
        return body;
    }
    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => serde_json::to_vec(&decamelize_keys(value)).unwrap_or(body),
        Err(e) => {
            log::debug!("[Api] Sending unparsable JSON body unchanged: {e}");
            body
        }
    }
}

/// Decode an inbound body.
///
/// Returns `None` for an empty body. JSON bodies are parsed and camelized;
/// other bodies (and JSON that fails to parse) come back as a string value.
#[must_use]
pub fn decode_response_body(content_type: Option<&str>, body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    if is_json(content_type) {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Null) => return None,
            Ok(value) => return Some(camelize_keys(value)),
            Err(e) => log::debug!("[Api] Response claims JSON but does not parse: {e}"),
        }
    }
    Some(Value::String(String::from_utf8_lossy(body).into_owned()))
}
