//! Wire response decoding across both error-encoding generations.
//!
//! An endpoint may answer in either of two formats:
//!
//! | Generation | Failure shape | Success shape |
//! |------------|---------------|---------------|
//! | current | `{"value":{"error":"<code>","message":".."}}` | `{"value": <payload>}` |
//! | legacy | `{"status":<int>,"value":{"message":".."}}` | `{"status":0,"value": <payload>}` |
//!
//! [`decode_response`] is the translator: it never returns normally when an
//! error is encoded, and it always produces a typed [`enum@Error`]. An
//! unrecognized code becomes [`WireErrorKind::Unknown`], never a parse
//! failure of the translator itself.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result, WireErrorKind};
use crate::identifiers::SessionId;

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a raw response body, raising any encoded wire error.
///
/// On success returns the result payload (the `value` field, or the whole
/// document for bodies that carry no envelope).
///
/// # Errors
///
/// - [`Error::Wire`] for any encoded failure of either generation
/// - [`Error::Wire`] with [`WireErrorKind::Unknown`] for unparseable bodies
pub fn decode_response(body: &str) -> Result<Value> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            return Err(Error::wire(WireErrorKind::Unknown, body.trim().to_string()));
        }
    };
    decode_value(parsed)
}

/// Decodes an already-parsed response document.
///
/// # Errors
///
/// Same as [`decode_response`].
pub fn decode_value(parsed: Value) -> Result<Value> {
    // Legacy generation: numeric status, 0 is success.
    if let Some(status) = parsed.get("status").and_then(Value::as_u64) {
        if status == 0 {
            return Ok(parsed.get("value").cloned().unwrap_or(Value::Null));
        }
        return Err(legacy_error(status, parsed.get("value")));
    }

    // Current generation: value object with a string error code.
    if let Some(value) = parsed.get("value") {
        if let Some(code) = value.get("error").and_then(Value::as_str) {
            return Err(current_error(code, value));
        }
        return Ok(value.clone());
    }

    // No envelope at all: opaque pass-through.
    Ok(parsed)
}

/// Builds the typed error for a current-format failure value.
fn current_error(code: &str, value: &Value) -> Error {
    let kind = WireErrorKind::from_code(code);
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(code)
        .to_string();

    Error::Wire {
        kind,
        message,
        alert_text: alert_text(kind, value),
    }
}

/// Builds the typed error for a legacy-format failure value.
pub(crate) fn legacy_error(status: u64, value: Option<&Value>) -> Error {
    let kind = WireErrorKind::from_legacy_status(status);

    // The legacy value is either an object with a message field or a bare
    // string.
    let message = match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("legacy status {status}")),
        None => format!("legacy status {status}"),
    };

    Error::Wire {
        kind,
        message,
        alert_text: value.and_then(|v| alert_text(kind, v)),
    }
}

/// Extracts the blocking dialog's text for unexpected-alert failures.
///
/// Current endpoints put it in `data.text`, legacy ones in `alert.text`.
fn alert_text(kind: WireErrorKind, value: &Value) -> Option<String> {
    if kind != WireErrorKind::UnexpectedAlertOpen {
        return None;
    }

    value
        .get("data")
        .and_then(|d| d.get("text"))
        .or_else(|| value.get("alert").and_then(|a| a.get("text")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ============================================================================
// NewSessionReply
// ============================================================================

/// Decoded payload of a successful new-session command.
#[derive(Debug, Clone)]
pub struct NewSessionReply {
    /// Session ID issued by the endpoint.
    pub session_id: SessionId,
    /// Negotiated capabilities.
    pub capabilities: Map<String, Value>,
}

/// Decodes a new-session response of either generation.
///
/// Current endpoints answer `{"value":{"sessionId":..,"capabilities":{..}}}`;
/// legacy ones put `sessionId` at the top level and the capability map in
/// `value`.
///
/// # Errors
///
/// - any error [`decode_response`] raises
/// - [`Error::SessionNotCreated`] if the success reply carries no session id
pub fn decode_new_session(body: &str) -> Result<NewSessionReply> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            return Err(Error::wire(WireErrorKind::Unknown, body.trim().to_string()));
        }
    };

    let value = decode_value(parsed.clone())?;

    let session_id = value
        .get("sessionId")
        .or_else(|| parsed.get("sessionId"))
        .and_then(Value::as_str)
        .map(SessionId::new)
        .ok_or_else(|| Error::session_not_created("endpoint reply carried no session id"))?;

    let capabilities = value
        .get("capabilities")
        .or(Some(&value))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(NewSessionReply {
        session_id,
        capabilities,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_current_success() {
        let value = decode_response(r#"{"value":{"ready":true}}"#).expect("success");
        assert_eq!(value, json!({"ready": true}));
    }

    #[test]
    fn test_legacy_success() {
        let value = decode_response(r#"{"status":0,"value":{"ready":true}}"#).expect("success");
        assert_eq!(value, json!({"ready": true}));
    }

    #[test]
    fn test_null_value_success() {
        let value = decode_response(r#"{"value":null}"#).expect("success");
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_round_trip_every_current_code() {
        for kind in WireErrorKind::all() {
            let body = json!({
                "value": {
                    "error": kind.code(),
                    "message": "original text",
                }
            })
            .to_string();

            let err = decode_response(&body).expect_err("must raise");
            assert_eq!(err.wire_kind(), Some(*kind), "code {}", kind.code());
            match err {
                Error::Wire { message, .. } => assert_eq!(message, "original text"),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_legacy_equivalence_with_current_encoding() {
        // Both encodings of an otherwise-equivalent failure produce the
        // same kind.
        let pairs: &[(u64, &str)] = &[
            (7, "no such element"),
            (10, "stale element reference"),
            (6, "invalid session id"),
            (26, "unexpected alert open"),
            (21, "timeout"),
            (33, "session not created"),
        ];

        for (status, code) in pairs {
            let legacy = json!({"status": status, "value": {"message": "m"}}).to_string();
            let current = json!({"value": {"error": code, "message": "m"}}).to_string();

            let legacy_err = decode_response(&legacy).expect_err("legacy");
            let current_err = decode_response(&current).expect_err("current");
            assert_eq!(
                legacy_err.wire_kind(),
                current_err.wire_kind(),
                "status {status} vs code {code}"
            );
        }
    }

    #[test]
    fn test_legacy_failure_scenario() {
        let err = decode_response(r#"{"status":7,"value":{"message":"no such element"}}"#)
            .expect_err("must raise");

        assert_eq!(err.wire_kind(), Some(WireErrorKind::NoSuchElement));
        assert_eq!(err.to_string(), "no such element: no such element");
    }

    #[test]
    fn test_legacy_string_value() {
        let err =
            decode_response(r#"{"status":13,"value":"boom"}"#).expect_err("must raise");
        assert_eq!(err.wire_kind(), Some(WireErrorKind::UnknownError));
        match err {
            Error::Wire { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fallback_totality() {
        // Unrecognized current code.
        let err = decode_response(r#"{"value":{"error":"made up code","message":"m"}}"#)
            .expect_err("must raise");
        assert_eq!(err.wire_kind(), Some(WireErrorKind::Unknown));

        // Unrecognized legacy status.
        let err = decode_response(r#"{"status":77,"value":{"message":"m"}}"#)
            .expect_err("must raise");
        assert_eq!(err.wire_kind(), Some(WireErrorKind::Unknown));

        // Not JSON at all: still a typed error, never a panic.
        let err = decode_response("<html>502 Bad Gateway</html>").expect_err("must raise");
        assert_eq!(err.wire_kind(), Some(WireErrorKind::Unknown));
        match err {
            Error::Wire { message, .. } => assert!(message.contains("502")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alert_text_current_format() {
        let body = json!({
            "value": {
                "error": "unexpected alert open",
                "message": "blocked",
                "data": {"text": "Are you sure?"},
            }
        })
        .to_string();

        match decode_response(&body).expect_err("must raise") {
            Error::Wire { alert_text, .. } => {
                assert_eq!(alert_text.as_deref(), Some("Are you sure?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alert_text_legacy_format() {
        let body = json!({
            "status": 26,
            "value": {"message": "blocked", "alert": {"text": "Leave page?"}},
        })
        .to_string();

        match decode_response(&body).expect_err("must raise") {
            Error::Wire { alert_text, .. } => {
                assert_eq!(alert_text.as_deref(), Some("Leave page?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alert_text_absent_for_other_kinds() {
        let body = json!({
            "value": {
                "error": "no such element",
                "message": "m",
                "data": {"text": "irrelevant"},
            }
        })
        .to_string();

        match decode_response(&body).expect_err("must raise") {
            Error::Wire { alert_text, .. } => assert!(alert_text.is_none()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_new_session_current_generation() {
        let body = json!({
            "value": {
                "sessionId": "abc",
                "capabilities": {"browserName": "firefox"},
            }
        })
        .to_string();

        let reply = decode_new_session(&body).expect("reply");
        assert_eq!(reply.session_id.as_str(), "abc");
        assert_eq!(
            reply.capabilities.get("browserName"),
            Some(&json!("firefox"))
        );
    }

    #[test]
    fn test_new_session_legacy_generation() {
        let body = json!({
            "status": 0,
            "sessionId": "xyz",
            "value": {"browserName": "safari"},
        })
        .to_string();

        let reply = decode_new_session(&body).expect("reply");
        assert_eq!(reply.session_id.as_str(), "xyz");
        assert_eq!(
            reply.capabilities.get("browserName"),
            Some(&json!("safari"))
        );
    }

    #[test]
    fn test_new_session_error_propagates() {
        let body = json!({
            "value": {"error": "session not created", "message": "no browser"},
        })
        .to_string();

        let err = decode_new_session(&body).expect_err("must raise");
        assert_eq!(err.wire_kind(), Some(WireErrorKind::SessionNotCreated));
    }

    #[test]
    fn test_new_session_missing_id() {
        let body = json!({"value": {"capabilities": {}}}).to_string();
        let err = decode_new_session(&body).expect_err("must raise");
        assert!(matches!(err, Error::SessionNotCreated { .. }));
    }
}
