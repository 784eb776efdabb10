// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire models exchanged between the host and the page runtime.
//
// Page → host messages are JSON objects tagged by `type`:
//
//   { "type": "title", "parameters": "<string>" }
//   { "type": "api", "id": "<string>", "parameters": "<json>", "callbackId": <int> }
//   { "type": "eventCallback", "id": "<string>", "callbackId": <int>, "parameters": <EventResult> }
//
// Host → page traffic is always a script expression; its payloads are the
// serialized `ApiResult` and the raw event data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type tags understood by the bridge.
pub const INVOKE_TITLE: &str = "title";
pub const INVOKE_API: &str = "api";
pub const INVOKE_EVENT_CALLBACK: &str = "eventCallback";

/// A decoded page → host message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeInfo {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub callback_id: Option<u64>,
}

/// The envelope as JSON, with a string-wrapped layer unwrapped.
fn envelope(raw: &str) -> serde_json::Result<Value> {
    match serde_json::from_str::<Value>(raw)? {
        Value::String(inner) => serde_json::from_str(&inner),
        other => Ok(other),
    }
}

impl InvokeInfo {
    /// Decode a raw posted message.
    ///
    /// Returns `Ok(None)` for a JSON `null`. Some webviews post the envelope as
    /// a JSON string holding the JSON object; that extra layer is unwrapped.
    pub fn parse(raw: &str) -> serde_json::Result<Option<Self>> {
        match envelope(raw)? {
            Value::Null => Ok(None),
            other => serde_json::from_value(other).map(Some),
        }
    }

    /// Type tag and callback id of a message that [`parse`](Self::parse)
    /// rejects, read field by field. `None` without a usable callback id.
    pub fn salvage_callback(raw: &str) -> Option<(Option<String>, u64)> {
        let value = envelope(raw).ok()?;
        let callback_id = value.get("callbackId")?.as_u64()?;
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        Some((kind, callback_id))
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The API parameter as JSON text, `None` when absent or blank.
    ///
    /// The page normally sends a pre-serialized string; a structured value is
    /// accepted too and re-serialized.
    pub fn parameters_json(&self) -> Option<String> {
        match self.parameters.as_ref()? {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The page title carried by a `title` message.
    pub fn title(&self) -> Option<String> {
        match self.parameters.as_ref()? {
            Value::String(text) => {
                Some(serde_json::from_str::<String>(text).unwrap_or_else(|_| text.clone()))
            }
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// The event result carried by an `eventCallback` message.
    pub fn event_result(&self) -> serde_json::Result<EventResult> {
        match self.parameters.clone().unwrap_or(Value::Null) {
            Value::String(text) => serde_json::from_str(&text),
            other => serde_json::from_value(other),
        }
    }
}

/// Outcome of a page → host API call, delivered through `_endApiCall`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiResult {
    pub value: Option<Value>,
    pub success: bool,
    pub error: Option<String>,
    pub error_type_name: Option<String>,
    pub error_type_full_name: Option<String>,
    pub is_ui_friendly_error: bool,
    pub error_detail: Option<String>,
}

impl ApiResult {
    pub fn success(value: Option<Value>) -> Self {
        Self {
            value,
            success: true,
            ..Self::default()
        }
    }

    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Error raised by a page-side event handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Outcome of a host → page call, posted back in an `eventCallback` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub has_result: bool,
    #[serde(default)]
    pub error: Option<EventError>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_subscriber: bool,
}

impl EventResult {
    /// Successful result. `None` means the handler returned nothing.
    pub fn ok(value: Option<Value>) -> Self {
        Self {
            has_result: value.is_some(),
            result: value,
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(error: EventError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn no_subscriber() -> Self {
        Self {
            no_subscriber: true,
            ..Self::default()
        }
    }

    /// The returned value, distinguishing "nothing returned" (`None`) from a
    /// returned JSON `null` (`Some(Value::Null)`).
    pub fn value(&self) -> Option<Value> {
        if !self.has_result {
            return None;
        }
        Some(self.result.clone().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_api_message() {
        let raw =
            r#"{"type":"api","id":"Handler.add","parameters":"{\"a\":2,\"b\":3}","callbackId":7}"#;
        let info = InvokeInfo::parse(raw).unwrap().unwrap();
        assert_eq!(info.kind(), Some(INVOKE_API));
        assert_eq!(info.id.as_deref(), Some("Handler.add"));
        assert_eq!(info.callback_id, Some(7));
        assert_eq!(info.parameters_json().as_deref(), Some(r#"{"a":2,"b":3}"#));
    }

    #[test]
    fn parse_null_and_double_encoded() {
        assert_eq!(InvokeInfo::parse("null").unwrap(), None);

        let inner = r#"{"type":"title","parameters":"Hello"}"#;
        let wrapped = serde_json::to_string(inner).unwrap();
        let info = InvokeInfo::parse(&wrapped).unwrap().unwrap();
        assert_eq!(info.title().as_deref(), Some("Hello"));
    }

    #[test]
    fn salvage_reads_callback_of_mistyped_message() {
        let raw = r#"{"type":"api","id":5,"callbackId":3}"#;
        assert!(InvokeInfo::parse(raw).is_err());
        assert_eq!(InvokeInfo::salvage_callback(raw), Some((Some("api".into()), 3)));

        let wrapped = serde_json::to_string(r#"{"type":7,"callbackId":9}"#).unwrap();
        assert_eq!(InvokeInfo::salvage_callback(&wrapped), Some((None, 9)));

        assert_eq!(InvokeInfo::salvage_callback(r#"{"type":"api","callbackId":"x"}"#), None);
        assert_eq!(InvokeInfo::salvage_callback("{not json"), None);
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(InvokeInfo::parse("{not json").is_err());
        assert!(InvokeInfo::parse(r#"{"type":"api","callbackId":"x"}"#).is_err());
    }

    #[test]
    fn structured_and_blank_parameters() {
        let info = InvokeInfo {
            parameters: Some(json!({"value": 2})),
            ..Default::default()
        };
        assert_eq!(info.parameters_json().as_deref(), Some(r#"{"value":2}"#));

        let blank = InvokeInfo {
            parameters: Some(json!("  ")),
            ..Default::default()
        };
        assert_eq!(blank.parameters_json(), None);
    }

    #[test]
    fn quoted_title_is_unwrapped() {
        let info = InvokeInfo {
            parameters: Some(json!("\"My Page\"")),
            ..Default::default()
        };
        assert_eq!(info.title().as_deref(), Some("My Page"));
    }

    #[test]
    fn event_result_distinguishes_null_from_absent() {
        let with_null: EventResult =
            serde_json::from_value(json!({"result": null, "hasResult": true, "success": true}))
                .unwrap();
        assert_eq!(with_null.value(), Some(Value::Null));

        let absent: EventResult =
            serde_json::from_value(json!({"hasResult": false, "success": true})).unwrap();
        assert_eq!(absent.value(), None);
    }

    #[test]
    fn event_result_from_string_parameters() {
        let info = InvokeInfo {
            parameters: Some(json!(r#"{"success":false,"noSubscriber":true}"#)),
            ..Default::default()
        };
        let result = info.event_result().unwrap();
        assert!(result.no_subscriber);
        assert!(!result.success);
    }

    #[test]
    fn api_result_wire_names() {
        let result = ApiResult::from_error("Unknown API call \"Nope.go\".");
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["success"], json!(false));
        assert_eq!(json["error"], json!("Unknown API call \"Nope.go\"."));
        assert_eq!(json["isUiFriendlyError"], json!(false));
        assert!(json.get("errorTypeFullName").is_some());
    }
}
