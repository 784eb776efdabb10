// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Headless webview for desktop/CI builds where no native webview is available.
//
// Instead of a JS engine it emulates the page runtime in Rust: `_endApiCall`
// results are captured, `_sendEvent` calls are routed to Rust closures
// registered as page event handlers, and their outcome is posted back as an
// `eventCallback` envelope exactly as the page runtime would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use spidereye_core::error::{BridgeError, Result};
use spidereye_core::models::{
    ApiResult, EventError, EventResult, INVOKE_API, INVOKE_EVENT_CALLBACK, INVOKE_TITLE,
};
use spidereye_core::types::CallId;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::script::{ScriptCall, parse_script};
use crate::traits::{MessageHandler, Webview};

/// Page-side event handler. `Ok(None)` means the handler returned `undefined`.
pub type PageHandler =
    Arc<dyn Fn(Value) -> std::result::Result<Option<Value>, EventError> + Send + Sync>;

/// A `_sendEvent` call the page received.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEvent {
    pub id: String,
    pub call_id: CallId,
    pub data: Value,
}

#[derive(Default)]
struct Page {
    scripts: Mutex<Vec<String>>,
    script_added: Notify,
    host: Mutex<Option<MessageHandler>>,
    event_handlers: Mutex<HashMap<String, PageHandler>>,
    api_results: Mutex<HashMap<u64, ApiResult>>,
    api_done: Notify,
    next_api_call: AtomicU64,
    fail_scripts: AtomicBool,
    silent: AtomicBool,
    string_envelopes: bool,
}

/// Stub webview; clones share the same emulated page.
#[derive(Clone, Default)]
pub struct StubWebview {
    page: Arc<Page>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StubWebview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post every envelope as a JSON string holding the JSON object, like a
    /// WebView2 page whose runtime stringifies its payloads.
    pub fn with_string_envelopes() -> Self {
        Self {
            page: Arc::new(Page {
                string_envelopes: true,
                ..Page::default()
            }),
        }
    }

    /// Emulates `addEventHandler`.
    pub fn add_event_handler<F>(&self, name: &str, handler: F)
    where
        F: Fn(Value) -> std::result::Result<Option<Value>, EventError> + Send + Sync + 'static,
    {
        lock(&self.page.event_handlers).insert(name.to_string(), Arc::new(handler));
    }

    pub fn remove_event_handler(&self, name: &str) {
        lock(&self.page.event_handlers).remove(name);
    }

    /// Make every later `execute_script` fail.
    pub fn fail_scripts(&self, fail: bool) {
        self.page.fail_scripts.store(fail, Ordering::SeqCst);
    }

    /// Stop answering `_sendEvent` calls, like a page that navigated away.
    pub fn go_silent(&self, silent: bool) {
        self.page.silent.store(silent, Ordering::SeqCst);
    }

    /// Emulates `updateTitle`.
    pub fn update_title(&self, title: &str) {
        self.post(json!({ "type": INVOKE_TITLE, "parameters": title }));
    }

    /// Emulates `invokeApi`; returns the callback id the host must answer.
    pub fn invoke_api(&self, id: &str, parameters: Option<&str>) -> u64 {
        let callback_id = self.page.next_api_call.fetch_add(1, Ordering::SeqCst);
        self.post(json!({
            "type": INVOKE_API,
            "id": id,
            "parameters": parameters,
            "callbackId": callback_id,
        }));
        callback_id
    }

    /// `invokeApi` and wait for the host's `_endApiCall`.
    pub async fn call_api(&self, id: &str, parameters: Option<&str>) -> ApiResult {
        let callback_id = self.invoke_api(id, parameters);
        self.api_result(callback_id).await
    }

    /// Wait for the `_endApiCall` answering `callback_id`.
    pub async fn api_result(&self, callback_id: u64) -> ApiResult {
        loop {
            let notified = self.page.api_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(result) = lock(&self.page.api_results).remove(&callback_id) {
                return result;
            }
            notified.await;
        }
    }

    /// Deliver a raw message to the host, bypassing the runtime emulation.
    pub fn post_raw(&self, message: &str) {
        let handler = lock(&self.page.host).clone();
        match handler {
            Some(handler) => handler(message.to_string()),
            None => warn!("stub page posted a message before the host listened"),
        }
    }

    /// Every script the host executed, in order.
    pub fn scripts(&self) -> Vec<String> {
        lock(&self.page.scripts).clone()
    }

    /// `_sendEvent` calls received so far.
    pub fn sent_events(&self) -> Vec<SentEvent> {
        self.scripts()
            .iter()
            .filter_map(|script| match parse_script(script) {
                Some(ScriptCall::SendEvent { id, call_id, data }) => {
                    Some(SentEvent { id, call_id, data })
                }
                _ => None,
            })
            .collect()
    }

    /// Wait until the host has executed at least `count` scripts.
    pub async fn wait_for_scripts(&self, count: usize) {
        loop {
            let notified = self.page.script_added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if lock(&self.page.scripts).len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn post(&self, envelope: Value) {
        let text = envelope.to_string();
        if self.page.string_envelopes {
            self.post_raw(&Value::String(text).to_string());
        } else {
            self.post_raw(&text);
        }
    }

    fn answer_event(&self, event: SentEvent) {
        let handler = lock(&self.page.event_handlers).get(&event.id).cloned();
        let outcome = match handler {
            None => EventResult::no_subscriber(),
            Some(handler) => match handler(event.data) {
                Ok(value) => EventResult::ok(value),
                Err(error) => EventResult::failed(error),
            },
        };
        self.post(json!({
            "type": INVOKE_EVENT_CALLBACK,
            "id": event.id,
            "callbackId": event.call_id,
            "parameters": outcome,
        }));
    }
}

#[async_trait]
impl Webview for StubWebview {
    async fn execute_script(&self, script: String) -> Result<Option<String>> {
        lock(&self.page.scripts).push(script.clone());
        self.page.script_added.notify_waiters();

        if self.page.fail_scripts.load(Ordering::SeqCst) {
            return Err(BridgeError::ScriptExecution("stub page rejected the script".into()));
        }

        match parse_script(&script) {
            Some(ScriptCall::EndApiCall { callback_id, result }) => {
                lock(&self.page.api_results).insert(callback_id, result);
                self.page.api_done.notify_waiters();
            }
            Some(ScriptCall::SendEvent { id, call_id, data }) => {
                if self.page.silent.load(Ordering::SeqCst) {
                    debug!(id = %id, call_id, "stub page is silent, event left unanswered");
                } else {
                    // The page answers from its own event loop, after the script returned.
                    let page = self.clone();
                    tokio::spawn(async move { page.answer_event(SentEvent { id, call_id, data }) });
                }
            }
            None => debug!("stub page ignored script"),
        }
        Ok(None)
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *lock(&self.page.host) = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{end_api_call, send_event};

    #[tokio::test]
    async fn end_api_call_is_captured() {
        let page = StubWebview::new();
        let script = end_api_call(3, r#"{"value":1,"success":true}"#);
        page.execute_script(script).await.unwrap();
        let result = page.api_result(3).await;
        assert!(result.success);
        assert_eq!(result.value, Some(json!(1)));
    }

    #[tokio::test]
    async fn events_are_answered_through_the_host_channel() {
        let page = StubWebview::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        page.set_message_handler(Arc::new(move |message: String| {
            let _ = tx.send(message);
        }));
        page.add_event_handler("Ui.double", |v| Ok(Some(json!(v.as_i64().unwrap_or(0) * 2))));

        page.execute_script(send_event("Ui.double", 1, "21").unwrap()).await.unwrap();
        let reply: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["type"], json!("eventCallback"));
        assert_eq!(reply["callbackId"], json!(1));
        assert_eq!(reply["parameters"]["result"], json!(42));
        assert_eq!(reply["parameters"]["hasResult"], json!(true));

        page.execute_script(send_event("Ui.absent", 2, "null").unwrap()).await.unwrap();
        let reply: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["parameters"]["noSubscriber"], json!(true));
        assert_eq!(reply["parameters"]["success"], json!(false));
    }

    #[tokio::test]
    async fn failing_scripts() {
        let page = StubWebview::new();
        page.fail_scripts(true);
        let err = page.execute_script("1 + 1".into()).await.unwrap_err();
        assert!(matches!(err, BridgeError::ScriptExecution(_)));
        assert_eq!(page.scripts(), vec!["1 + 1".to_string()]);
    }

    #[test]
    fn string_envelopes_are_double_encoded() {
        let page = StubWebview::with_string_envelopes();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        page.set_message_handler(Arc::new(move |m: String| lock(&sink).push(m)));
        page.update_title("Home");
        let raw = lock(&seen)[0].clone();
        let inner: String = serde_json::from_str(&raw).unwrap();
        let envelope: Value = serde_json::from_str(&inner).unwrap();
        assert_eq!(envelope["parameters"], json!("Home"));
    }
}
