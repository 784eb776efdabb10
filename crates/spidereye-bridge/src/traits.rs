// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic capabilities the bridge needs from a native webview.
//
// Each platform delivers script messages and script results through its own
// callback mechanism (WebKit script message handlers, WebView2 web messages).
// The bridge only sees these two operations.

use std::sync::Arc;

use async_trait::async_trait;
use spidereye_core::error::Result;

/// Callback invoked once per message posted by the page.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

/// A native webview embedding.
#[async_trait]
pub trait Webview: Send + Sync {
    /// Run `script` in the page and return its string result, if any.
    ///
    /// Implementations marshal the call onto their UI thread and return
    /// without blocking it; the future resolves when the native layer
    /// reports completion. A script evaluation failure must surface as
    /// `BridgeError::ScriptExecution`.
    async fn execute_script(&self, script: String) -> Result<Option<String>>;

    /// Install the handler for messages posted by the page runtime.
    /// A later call replaces the earlier handler.
    fn set_message_handler(&self, handler: MessageHandler);
}
