// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// WebviewBridge: the mediator between one webview and the host.
//
// Page → host: every posted message is decoded and dispatched on a tokio
// task, never on the thread that delivered it. `api` calls are always
// answered with `_endApiCall`; `eventCallback` messages complete the pending
// host → page call they name. Anything that fails without a caller to
// answer goes to the diagnostics sink.
//
// Host → page: `invoke_remote` allocates a call id, parks a oneshot sender in
// the pending table, runs `_sendEvent` and waits. The entry is removed by
// whoever gets to it first: the matching `eventCallback`, a timeout, a script
// failure, an abort, or the caller dropping the future. Only the remover can
// complete the call, so each call completes at most once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use spidereye_core::config::BridgeConfig;
use spidereye_core::error::{BridgeError, Result, ScriptError};
use spidereye_core::models::{
    ApiResult, EventResult, INVOKE_API, INVOKE_EVENT_CALLBACK, INVOKE_TITLE, InvokeInfo,
};
use spidereye_core::types::{CallId, InternalError, MissingMethodBehavior};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::codec::{JsonCodec, JsonCodecExt, SerdeJsonCodec};
use crate::di::ServiceProvider;
use crate::diagnostics::Diagnostics;
use crate::error_mapper::{self, ErrorMapper};
use crate::global::GlobalHandlers;
use crate::registry::{ApiRegistry, BridgeObject, panic_message};
use crate::script;
use crate::traits::Webview;

/// Notifications raised by a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The page reported a new document title.
    TitleChanged(String),
    /// A host → page call found no page handler (policy `Report`).
    MissingClientImplementation(String),
}

struct PendingCall {
    id: String,
    behavior: MissingMethodBehavior,
    tx: oneshot::Sender<Result<EventResult>>,
}

type PendingTable = Mutex<HashMap<CallId, PendingCall>>;

fn lock_table(pending: &PendingTable) -> MutexGuard<'_, HashMap<CallId, PendingCall>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes its call from the pending table when the waiting future ends,
/// however it ends.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    call_id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if lock_table(self.pending).remove(&self.call_id).is_some() {
            debug!(call_id = self.call_id, "pending call released without an answer");
        }
    }
}

pub struct WebviewBridge {
    webview: Arc<dyn Webview>,
    registry: Arc<ApiRegistry>,
    pending: PendingTable,
    last_call_id: AtomicU64,
    events: broadcast::Sender<BridgeEvent>,
    diagnostics: Arc<Diagnostics>,
    error_mapper: Option<Arc<dyn ErrorMapper>>,
    codec: Arc<dyn JsonCodec>,
    call_timeout: Option<Duration>,
    runtime: Handle,
}

/// Configures and builds a [`WebviewBridge`].
pub struct BridgeBuilder {
    webview: Arc<dyn Webview>,
    config: BridgeConfig,
    services: Option<Arc<ServiceProvider>>,
    globals: Option<Arc<GlobalHandlers>>,
    diagnostics: Option<Arc<Diagnostics>>,
    error_mapper: Option<Arc<dyn ErrorMapper>>,
    codec: Arc<dyn JsonCodec>,
    runtime: Option<Handle>,
}

impl BridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable handler registration by type.
    pub fn services(mut self, services: Arc<ServiceProvider>) -> Self {
        self.services = Some(services);
        self
    }

    /// Global handler list to subscribe to instead of the process-wide one.
    pub fn global_handlers(mut self, globals: Arc<GlobalHandlers>) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Per-bridge mapper; without one the process-wide mapper is used.
    pub fn error_mapper(mut self, mapper: Arc<dyn ErrorMapper>) -> Self {
        self.error_mapper = Some(mapper);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn JsonCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Runtime that dispatches page messages. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Register bridge and global handlers, then start listening to the page.
    pub fn build(self) -> Result<Arc<WebviewBridge>> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BridgeError::NoRuntime)?,
        };

        let registry = Arc::new(ApiRegistry::new(self.services.clone(), self.codec.clone()));
        if let Some(services) = &self.services {
            services.register_bridge_handlers(&registry)?;
        }
        self.globals
            .unwrap_or_else(GlobalHandlers::shared)
            .subscribe(&registry)?;

        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let bridge = Arc::new(WebviewBridge {
            webview: self.webview,
            registry,
            pending: Mutex::new(HashMap::new()),
            last_call_id: AtomicU64::new(0),
            events,
            diagnostics: self.diagnostics.unwrap_or_else(Diagnostics::shared),
            error_mapper: self.error_mapper,
            codec: self.codec,
            call_timeout: self.config.call_timeout(),
            runtime,
        });

        let weak = Arc::downgrade(&bridge);
        bridge.webview.set_message_handler(Arc::new(move |message: String| {
            if let Some(bridge) = weak.upgrade() {
                bridge.handle_script_message(message);
            }
        }));

        info!(
            methods = bridge.registry.method_names().len(),
            di = bridge.is_dependency_injection_enabled(),
            "webview bridge ready"
        );
        Ok(bridge)
    }
}

impl WebviewBridge {
    pub fn builder(webview: Arc<dyn Webview>) -> BridgeBuilder {
        BridgeBuilder {
            webview,
            config: BridgeConfig::default(),
            services: None,
            globals: None,
            diagnostics: None,
            error_mapper: None,
            codec: Arc::new(SerdeJsonCodec),
            runtime: None,
        }
    }

    pub fn webview(&self) -> &Arc<dyn Webview> {
        &self.webview
    }

    pub fn registry(&self) -> &Arc<ApiRegistry> {
        &self.registry
    }

    pub fn is_dependency_injection_enabled(&self) -> bool {
        self.registry.is_dependency_injection_enabled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Host → page calls still waiting for an answer.
    pub fn pending_calls(&self) -> usize {
        lock_table(&self.pending).len()
    }

    // -- Handler registration --

    pub fn add_handler<T: BridgeObject>(&self, handler: Arc<T>) -> Result<()> {
        self.registry.add_instance(None, handler, false)
    }

    pub fn add_or_replace_handler<T: BridgeObject>(&self, handler: Arc<T>) -> Result<()> {
        self.registry.add_instance(None, handler, true)
    }

    /// Register under `root` instead of the type's own root name.
    pub fn add_handler_named<T: BridgeObject>(
        &self,
        root: &str,
        handler: Arc<T>,
        replace: bool,
    ) -> Result<()> {
        self.registry.add_instance(Some(root), handler, replace)
    }

    /// Register a type resolved per call from the service provider.
    pub fn add_handler_type<T: BridgeObject>(&self) -> Result<()> {
        self.registry.add_type::<T>(None, false)
    }

    pub fn add_or_replace_handler_type<T: BridgeObject>(&self) -> Result<()> {
        self.registry.add_type::<T>(None, true)
    }

    // -- Page → host --

    /// Entry point for messages posted by the page.
    ///
    /// Returns immediately; the message is processed on the bridge runtime.
    /// Errors and panics during processing are reported to diagnostics.
    pub fn handle_script_message(self: &Arc<Self>, message: String) -> JoinHandle<()> {
        let bridge = self.clone();
        self.runtime.spawn(async move {
            let work = {
                let bridge = bridge.clone();
                let message = message.clone();
                tokio::spawn(async move { bridge.process_message(&message).await })
            };
            let failure = match work.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(join) if join.is_panic() => {
                    let text = panic_message(&*join.into_panic());
                    format!("panic: {}", text.as_deref().unwrap_or("non-string panic payload"))
                }
                Err(join) => join.to_string(),
            };
            bridge.diagnostics.report(InternalError::new(
                format!("Exception while handling script call for '{message}'"),
                Some(failure),
            ));
        })
    }

    async fn process_message(&self, raw: &str) -> Result<()> {
        let info = match InvokeInfo::parse(raw) {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!("null script message dropped");
                return Ok(());
            }
            Err(e) => {
                if let Some((kind, callback_id)) = InvokeInfo::salvage_callback(raw) {
                    self.answer_malformed(kind.as_deref(), callback_id, &e).await?;
                }
                return Err(e.into());
            }
        };

        match (info.kind(), info.callback_id) {
            (Some(INVOKE_TITLE), _) => {
                let title = info.title().unwrap_or_default();
                debug!(title = %title, "page title changed");
                let _ = self.events.send(BridgeEvent::TitleChanged(title));
            }
            (Some(INVOKE_API), Some(callback_id)) => {
                let result = self.resolve_call(info.id.as_deref(), info.parameters_json()).await;
                self.end_api_call(callback_id, &result).await?;
            }
            (Some(INVOKE_API), None) => {
                return Err(BridgeError::Argument(format!(
                    "api call \"{}\" carries no callbackId",
                    info.id.as_deref().unwrap_or_default()
                )));
            }
            (Some(INVOKE_EVENT_CALLBACK), Some(call_id)) => self.complete_event(&info, call_id),
            (kind, Some(callback_id)) => {
                let message = format!("Invalid invoke type \"{}\".", kind.unwrap_or("<null>"));
                self.end_api_call(callback_id, &ApiResult::from_error(message)).await?;
            }
            (Some(INVOKE_EVENT_CALLBACK), None) => {
                return Err(BridgeError::Argument(format!(
                    "eventCallback \"{}\" carries no callbackId",
                    info.id.as_deref().unwrap_or_default()
                )));
            }
            (kind, None) => {
                return Err(BridgeError::Argument(format!(
                    "Invalid invoke type \"{}\".",
                    kind.unwrap_or("<null>")
                )));
            }
        }
        Ok(())
    }

    /// Answer a message that names a callback id but does not decode, so the
    /// waiting side is released instead of hanging.
    async fn answer_malformed(
        &self,
        kind: Option<&str>,
        callback_id: u64,
        error: &serde_json::Error,
    ) -> Result<()> {
        warn!(callback_id, kind = ?kind, error = %error, "malformed script message");
        if kind == Some(INVOKE_EVENT_CALLBACK) {
            let Some(pending) = lock_table(&self.pending).remove(&callback_id) else {
                return Ok(());
            };
            let failure = ScriptError::new(format!(
                "Malformed eventCallback for \"{}\": {error}",
                pending.id
            ));
            if pending.tx.send(Err(failure.into())).is_err() {
                debug!(callback_id, "caller stopped waiting before the page answered");
            }
            return Ok(());
        }
        let result = ApiResult::from_error(format!("Invalid script message: {error}"));
        self.end_api_call(callback_id, &result).await
    }

    #[instrument(skip(self, parameters))]
    async fn resolve_call(&self, id: Option<&str>, parameters: Option<String>) -> ApiResult {
        let Some(id) = id.filter(|id| !id.trim().is_empty()) else {
            return ApiResult::from_error("No API name given.");
        };
        let Some(method) = self.registry.resolve(id) else {
            debug!("unknown api call");
            return ApiResult::from_error(format!("Unknown API call \"{id}\"."));
        };

        match self.registry.invoke(&method, parameters).await {
            Ok(value) => ApiResult::success(method.has_return_value().then_some(value)),
            Err(err) => {
                debug!(error = %err, error_type = err.full_type_name(), "api handler failed");
                self.mapper().map_error(&err)
            }
        }
    }

    async fn end_api_call(&self, callback_id: u64, result: &ApiResult) -> Result<()> {
        let result_json = self.codec.serialize(result)?;
        self.webview
            .execute_script(script::end_api_call(callback_id, &result_json))
            .await?;
        Ok(())
    }

    fn complete_event(&self, info: &InvokeInfo, call_id: CallId) {
        let Some(pending) = lock_table(&self.pending).remove(&call_id) else {
            let name = info.id.as_deref().unwrap_or_default();
            warn!(call_id, id = %name, "eventCallback for unknown or completed call");
            self.diagnostics.report_message(
                format!("No callback for eventCallback with name {name} and id {call_id}"),
                None,
            );
            return;
        };

        let outcome = info
            .event_result()
            .map_err(BridgeError::from)
            .and_then(|result| self.resolve_event_result(&pending.id, result, pending.behavior));
        if pending.tx.send(outcome).is_err() {
            debug!(call_id, "caller stopped waiting before the page answered");
        }
    }

    fn resolve_event_result(
        &self,
        id: &str,
        result: EventResult,
        behavior: MissingMethodBehavior,
    ) -> Result<EventResult> {
        if result.no_subscriber {
            return match behavior {
                MissingMethodBehavior::Report => {
                    warn!(id, "page has no handler for client method");
                    let _ = self
                        .events
                        .send(BridgeEvent::MissingClientImplementation(id.to_string()));
                    Ok(result)
                }
                MissingMethodBehavior::Ignore => Ok(result),
                MissingMethodBehavior::Throw => Err(BridgeError::MissingClientMethodImplementation {
                    id: id.to_string(),
                }),
            };
        }
        if result.success {
            return Ok(result);
        }

        let error = result.error.unwrap_or_default();
        let message = match (non_blank(error.message), non_blank(error.name)) {
            (None, _) => format!("Error executing Event with ID \"{id}\"."),
            (Some(message), Some(name)) => format!("{name}: {message}"),
            (Some(message), None) => message,
        };
        let script_error = match non_blank(error.stack) {
            Some(stack) => ScriptError::with_stack(message, stack),
            None => ScriptError::new(message),
        };
        Err(script_error.into())
    }

    fn mapper(&self) -> Arc<dyn ErrorMapper> {
        self.error_mapper
            .clone()
            .unwrap_or_else(error_mapper::error_mapper)
    }

    // -- Host → page --

    /// Call the page handler `id` with `data` and wait for its answer.
    #[instrument(skip(self, data), fields(call_id = tracing::field::Empty))]
    pub async fn invoke_remote<D>(
        &self,
        id: &str,
        data: &D,
        behavior: MissingMethodBehavior,
    ) -> Result<EventResult>
    where
        D: Serialize + ?Sized,
    {
        if id.trim().is_empty() {
            return Err(BridgeError::Argument("client method id must not be empty".into()));
        }
        let data_json = self.codec.serialize(data)?;
        let call_id = self.last_call_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::Span::current().record("call_id", call_id);
        let script = script::send_event(id, call_id, &data_json)?;

        let (tx, rx) = oneshot::channel();
        lock_table(&self.pending).insert(
            call_id,
            PendingCall {
                id: id.to_string(),
                behavior,
                tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            call_id,
        };

        self.webview.execute_script(script).await?;

        let answer = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| BridgeError::CallTimedOut {
                    id: id.to_string(),
                    call_id,
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => rx.await,
        };
        answer.map_err(|_| BridgeError::CallAborted {
            id: id.to_string(),
            call_id,
        })?
    }

    /// Like [`invoke_remote`](Self::invoke_remote), decoding the returned
    /// value. `None` when the page returned nothing.
    pub async fn invoke<R, D>(
        &self,
        id: &str,
        data: &D,
        behavior: MissingMethodBehavior,
    ) -> Result<Option<R>>
    where
        R: DeserializeOwned,
        D: Serialize + ?Sized,
    {
        let result = self.invoke_remote(id, data, behavior).await?;
        match result.value() {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Like [`invoke`](Self::invoke), with `R::default()` for "nothing returned".
    pub async fn invoke_or_default<R, D>(
        &self,
        id: &str,
        data: &D,
        behavior: MissingMethodBehavior,
    ) -> Result<R>
    where
        R: DeserializeOwned + Default,
        D: Serialize + ?Sized,
    {
        Ok(self.invoke(id, data, behavior).await?.unwrap_or_default())
    }

    /// Fail every waiting host → page call with `CallAborted`, e.g. when the
    /// page navigates or the window closes. Returns how many were aborted.
    pub fn abort_pending_calls(&self) -> usize {
        let aborted: Vec<PendingCall> =
            lock_table(&self.pending).drain().map(|(_, call)| call).collect();
        if !aborted.is_empty() {
            info!(count = aborted.len(), "pending client calls aborted");
        }
        // Dropping the senders wakes each caller with CallAborted.
        aborted.len()
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
