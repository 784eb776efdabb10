// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host → page script expressions and the page runtime asset.
//
// Everything the host sends to the page is a call on the runtime object:
//
//   window._spidereye._endApiCall(<callbackId>, <ApiResult json>)
//   window._spidereye._sendEvent(<id json>, <callId>, <data json>)

use serde_json::Value;
use spidereye_core::models::ApiResult;
use spidereye_core::types::CallId;

/// Global the runtime is installed under.
pub const RUNTIME_OBJECT: &str = "window._spidereye";

/// Source of the page runtime (defines the `SpiderEyeBridge` constructor).
pub const RUNTIME_SCRIPT: &str = include_str!("scripts/spidereye-bridge.js");

/// How the page runtime reaches the native host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostTarget {
    /// WebKitGTK / WKWebView script message handler named `external`.
    WebKit,
    /// WebView2 `chrome.webview.postMessage`.
    WebView2,
    /// Any other JS function expression taking one argument.
    Custom(String),
}

impl PostTarget {
    fn function_expr(&self) -> &str {
        match self {
            Self::WebKit => {
                "function (m) { window.webkit.messageHandlers.external.postMessage(m); }"
            }
            Self::WebView2 => "function (m) { window.chrome.webview.postMessage(m); }",
            Self::Custom(expr) => expr,
        }
    }
}

/// Script injected at document start: the runtime plus its installation.
pub fn bootstrap_script(target: &PostTarget, convert_payload_to_json: bool) -> String {
    let post = target.function_expr();
    let to_json = convert_payload_to_json;
    format!("{RUNTIME_SCRIPT}\n{RUNTIME_OBJECT} = new SpiderEyeBridge({post}, {to_json});\n")
}

/// Resolve the page's API callback `callback_id` with `result_json`.
pub fn end_api_call(callback_id: u64, result_json: &str) -> String {
    format!("{RUNTIME_OBJECT}._endApiCall({callback_id}, {result_json})")
}

/// Invoke the page handler `id`. The id is JSON-encoded so any name is escaped.
pub fn send_event(id: &str, call_id: CallId, data_json: &str) -> serde_json::Result<String> {
    let id_json = serde_json::to_string(id)?;
    Ok(format!("{RUNTIME_OBJECT}._sendEvent({id_json}, {call_id}, {data_json})"))
}

/// A decoded host → page script, as produced by this module.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCall {
    EndApiCall { callback_id: u64, result: ApiResult },
    SendEvent { id: String, call_id: CallId, data: Value },
}

/// Decode a script built by [`end_api_call`] or [`send_event`].
///
/// The argument list of both calls is valid JSON once wrapped in brackets.
pub fn parse_script(script: &str) -> Option<ScriptCall> {
    let call = script.trim().strip_prefix(RUNTIME_OBJECT)?.strip_prefix('.')?;
    let open = call.find('(')?;
    let name = &call[..open];
    let args = call[open + 1..].strip_suffix(')')?;
    let mut args: Vec<Value> = serde_json::from_str(&format!("[{args}]")).ok()?;

    match (name, args.len()) {
        ("_endApiCall", 2) => {
            let result = serde_json::from_value(args.pop()?).ok()?;
            let callback_id = args.pop()?.as_u64()?;
            Some(ScriptCall::EndApiCall { callback_id, result })
        }
        ("_sendEvent", 3) => {
            let data = args.pop()?;
            let call_id = args.pop()?.as_u64()?;
            let id = args.pop()?.as_str()?.to_string();
            Some(ScriptCall::SendEvent { id, call_id, data })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_event_escapes_id() {
        let script = send_event("Ui.say \"hi\"", 3, r#"{"x":1}"#).unwrap();
        assert_eq!(
            script,
            r#"window._spidereye._sendEvent("Ui.say \"hi\"", 3, {"x":1})"#
        );
    }

    #[test]
    fn parse_send_event() {
        let script = send_event("Ui.prompt", 12, r#""Your name?""#).unwrap();
        assert_eq!(
            parse_script(&script),
            Some(ScriptCall::SendEvent {
                id: "Ui.prompt".into(),
                call_id: 12,
                data: json!("Your name?"),
            })
        );
    }

    #[test]
    fn parse_end_api_call() {
        let result = ApiResult::success(Some(json!(5)));
        let script = end_api_call(7, &serde_json::to_string(&result).unwrap());
        assert_eq!(
            parse_script(&script),
            Some(ScriptCall::EndApiCall { callback_id: 7, result })
        );
    }

    #[test]
    fn foreign_scripts_are_not_parsed() {
        assert_eq!(parse_script("document.title"), None);
        assert_eq!(parse_script("window._spidereye.updateTitle(\"x\")"), None);
    }

    #[test]
    fn bootstrap_installs_runtime() {
        let script = bootstrap_script(&PostTarget::WebKit, true);
        assert!(script.contains("function SpiderEyeBridge(post, stringify)"));
        assert!(script.contains("window._spidereye = new SpiderEyeBridge("));
        assert!(script.contains("messageHandlers.external.postMessage"));
        assert!(script.trim_end().ends_with(", true);"));
    }
}
