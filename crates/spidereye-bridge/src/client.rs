// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client services: host-side handles to operations implemented by the page.
//
// An interface is described by a `ClientInterface` table (name, parameter
// count, call mode, page-side name, missing-handler policy per method). A
// hand-written adapter struct wraps a `ClientService` built from that table
// and forwards each of its methods to `call` / `notify`.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::Value;
use spidereye_core::error::{BridgeError, Result};
use spidereye_core::types::{CallMode, MissingMethodBehavior, normalize_to_js_name};
use tracing::{debug, warn};

use crate::windows::{Window, WindowCollection};

const MISSING_TARGET_WINDOW: &str =
    "if the call mode is SingleWindow, the last provided argument must be the target window.";

/// Declaration of one client method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMethod {
    name: &'static str,
    parameters: usize,
    call_mode: CallMode,
    remote_name: Option<&'static str>,
    missing: MissingMethodBehavior,
}

impl ClientMethod {
    /// `parameters` counts the host method's parameters, including the
    /// trailing window of a `SingleWindow` method.
    pub const fn new(name: &'static str, parameters: usize) -> Self {
        Self {
            name,
            parameters,
            call_mode: CallMode::MainWindow,
            remote_name: None,
            missing: MissingMethodBehavior::Report,
        }
    }

    pub const fn call_mode(mut self, call_mode: CallMode) -> Self {
        self.call_mode = call_mode;
        self
    }

    /// Page-side method name, used verbatim instead of the normalized host name.
    pub const fn remote_name(mut self, name: &'static str) -> Self {
        self.remote_name = Some(name);
        self
    }

    pub const fn on_missing(mut self, behavior: MissingMethodBehavior) -> Self {
        self.missing = behavior;
        self
    }
}

/// Static description of a client interface.
pub trait ClientInterface {
    /// Prefix of the page-side ids, `Ui` in `Ui.showMessage`.
    const NAME: &'static str;

    fn methods() -> Vec<ClientMethod>;
}

#[derive(Debug, Clone)]
struct Route {
    id: String,
    call_mode: CallMode,
    missing: MissingMethodBehavior,
}

/// Validated client interface bound to the application's windows.
#[derive(Clone)]
pub struct ClientService {
    name: String,
    routes: HashMap<&'static str, Route>,
    windows: WindowCollection,
}

impl ClientService {
    pub fn create<I: ClientInterface>(windows: WindowCollection) -> Result<Self> {
        Self::from_methods(I::NAME, I::methods(), windows)
    }

    /// Validate `methods` and resolve their page-side ids.
    pub fn from_methods(
        name: &str,
        methods: Vec<ClientMethod>,
        windows: WindowCollection,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(BridgeError::InvalidInterfaceShape(
                "client service name must not be empty".into(),
            ));
        }

        let mut routes = HashMap::with_capacity(methods.len());
        for method in methods {
            let (min, max) = method.call_mode.parameter_range();
            if method.parameters < min || method.parameters > max {
                return Err(BridgeError::InvalidInterfaceShape(format!(
                    "the method {} of client service {name} takes {} parameters. \
                     For the call mode {:?} only between {min} and {max} parameters are allowed. \
                     If a call mode expects a window, the last parameter should be the window.",
                    method.name, method.parameters, method.call_mode
                )));
            }

            let remote = method
                .remote_name
                .map(str::to_string)
                .unwrap_or_else(|| normalize_to_js_name(method.name));
            let route = Route {
                id: format!("{name}.{remote}"),
                call_mode: method.call_mode,
                missing: method.missing,
            };
            if routes.insert(method.name, route).is_some() {
                return Err(BridgeError::InvalidInterfaceShape(format!(
                    "the method {} of client service {name} is declared twice",
                    method.name
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            routes,
            windows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Page-side id of a host method, e.g. `Ui.showMessage`.
    pub fn id_of(&self, method: &str) -> Option<&str> {
        self.routes.get(method).map(|r| r.id.as_str())
    }

    /// Call a client method and decode its result.
    ///
    /// `window` is the target of a `SingleWindow` method and ignored otherwise.
    /// A `Broadcast` call runs on every open window concurrently and returns
    /// the result of the last window in opening order.
    pub async fn call<A, R>(
        &self,
        method: &str,
        argument: Option<&A>,
        window: Option<&Window>,
    ) -> Result<Option<R>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let route = self.route(method)?;
        let data = serde_json::to_value(argument)?;

        match route.call_mode {
            CallMode::MainWindow => {
                let main = self.windows.main_window().ok_or(BridgeError::NoWindow)?;
                main.bridge().invoke(&route.id, &data, route.missing).await
            }
            CallMode::SingleWindow => {
                let target = window
                    .ok_or_else(|| BridgeError::Argument(MISSING_TARGET_WINDOW.into()))?;
                target.bridge().invoke(&route.id, &data, route.missing).await
            }
            CallMode::Broadcast => self.broadcast(route, data).await,
        }
    }

    /// Call a client method whose result is not used.
    pub async fn notify<A>(
        &self,
        method: &str,
        argument: Option<&A>,
        window: Option<&Window>,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
    {
        self.call::<A, IgnoredAny>(method, argument, window).await?;
        Ok(())
    }

    async fn broadcast<R>(&self, route: &Route, data: Value) -> Result<Option<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let windows = self.windows.snapshot();
        debug!(id = %route.id, windows = windows.len(), "broadcasting client call");

        let calls: Vec<_> = windows
            .into_iter()
            .map(|window| {
                let id = route.id.clone();
                let data = data.clone();
                let missing = route.missing;
                let window_id = window.id();
                let handle = tokio::spawn(async move {
                    window.bridge().invoke::<R, Value>(&id, &data, missing).await
                });
                (window_id, handle)
            })
            .collect();

        let mut last = Ok(None);
        let count = calls.len();
        for (index, (window_id, handle)) in calls.into_iter().enumerate() {
            let outcome = handle.await.unwrap_or_else(|e| {
                Err(BridgeError::ScriptExecution(format!("client call task failed: {e}")))
            });
            if index + 1 < count {
                if let Err(e) = &outcome {
                    warn!(id = %route.id, window = %window_id, error = %e, "broadcast call failed");
                }
            }
            last = outcome;
        }
        last
    }

    fn route(&self, method: &str) -> Result<&Route> {
        self.routes.get(method).ok_or_else(|| {
            BridgeError::Argument(format!(
                "\"{method}\" is not a method of client service \"{}\"",
                self.name
            ))
        })
    }
}
