// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Open windows, in the order they were opened.

use std::sync::{Arc, PoisonError, RwLock};

use spidereye_core::types::WindowId;
use tracing::info;

use crate::bridge::WebviewBridge;

/// A window as seen by client services: an id and its bridge.
#[derive(Clone)]
pub struct Window {
    id: WindowId,
    bridge: Arc<WebviewBridge>,
}

impl Window {
    pub fn new(bridge: Arc<WebviewBridge>) -> Self {
        Self {
            id: WindowId::new(),
            bridge,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn bridge(&self) -> &Arc<WebviewBridge> {
        &self.bridge
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window").field("id", &self.id).finish()
    }
}

/// Shared, ordered list of open windows. Clones share the same list.
#[derive(Clone, Default)]
pub struct WindowCollection {
    windows: Arc<RwLock<Vec<Window>>>,
}

impl WindowCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened window around `bridge`.
    pub fn open(&self, bridge: Arc<WebviewBridge>) -> Window {
        let window = Window::new(bridge);
        self.add(window.clone());
        window
    }

    pub fn add(&self, window: Window) {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        info!(window = %window.id, open = windows.len() + 1, "window opened");
        windows.push(window);
    }

    /// Forget a closed window and abort the calls still waiting on its page.
    pub fn remove(&self, id: WindowId) -> Option<Window> {
        let removed = {
            let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
            let index = windows.iter().position(|w| w.id == id)?;
            windows.remove(index)
        };
        let aborted = removed.bridge.abort_pending_calls();
        info!(window = %id, aborted, "window closed");
        Some(removed)
    }

    /// The first opened window that is still open.
    pub fn main_window(&self) -> Option<Window> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }

    pub fn get(&self, id: WindowId) -> Option<Window> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|w| w.id == id)
            .cloned()
    }

    /// Open windows at this moment, in opening order.
    pub fn snapshot(&self) -> Vec<Window> {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once every window has been closed.
    pub fn all_closed(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::GlobalHandlers;
    use crate::stub::StubWebview;
    use spidereye_core::error::BridgeError;
    use spidereye_core::types::MissingMethodBehavior;

    fn bridge(page: &StubWebview) -> Arc<WebviewBridge> {
        WebviewBridge::builder(Arc::new(page.clone()))
            .global_handlers(Arc::new(GlobalHandlers::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn main_window_is_first_still_open() {
        let windows = WindowCollection::new();
        assert!(windows.main_window().is_none());

        let first = windows.open(bridge(&StubWebview::new()));
        let second = windows.open(bridge(&StubWebview::new()));
        assert_eq!(windows.main_window().unwrap().id(), first.id());

        windows.remove(first.id());
        assert_eq!(windows.main_window().unwrap().id(), second.id());
        assert!(windows.get(first.id()).is_none());
        assert!(windows.remove(first.id()).is_none());

        windows.remove(second.id());
        assert!(windows.all_closed());
    }

    #[tokio::test]
    async fn closing_a_window_aborts_its_calls() {
        let page = StubWebview::new();
        page.go_silent(true);
        let windows = WindowCollection::new();
        let window = windows.open(bridge(&page));

        let caller = {
            let bridge = window.bridge().clone();
            tokio::spawn(async move {
                bridge
                    .invoke_remote("Ui.wait", &(), MissingMethodBehavior::Report)
                    .await
            })
        };
        page.wait_for_scripts(1).await;
        windows.remove(window.id());

        assert!(matches!(caller.await.unwrap(), Err(BridgeError::CallAborted { .. })));
    }
}
