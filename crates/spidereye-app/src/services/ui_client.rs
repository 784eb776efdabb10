// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page operations the host calls as `UiBridgeClientService.*`.

use spidereye_bridge::{ClientInterface, ClientMethod, ClientService, Window, WindowCollection};
use spidereye_core::error::Result;
use spidereye_core::types::{CallMode, MissingMethodBehavior};

pub struct UiClientInterface;

impl ClientInterface for UiClientInterface {
    const NAME: &'static str = "UiBridgeClientService";

    fn methods() -> Vec<ClientMethod> {
        vec![
            ClientMethod::new("show_message", 1).call_mode(CallMode::Broadcast),
            ClientMethod::new("prompt", 1).on_missing(MissingMethodBehavior::Throw),
            ClientMethod::new("set_status", 2)
                .call_mode(CallMode::SingleWindow)
                .remote_name("status")
                .on_missing(MissingMethodBehavior::Ignore),
        ]
    }
}

/// Typed handle over the page's `UiBridgeClientService`.
#[derive(Clone)]
pub struct UiClient {
    service: ClientService,
}

impl UiClient {
    pub fn new(windows: WindowCollection) -> Result<Self> {
        Ok(Self {
            service: ClientService::create::<UiClientInterface>(windows)?,
        })
    }

    /// Show `message` in every open window.
    pub async fn show_message(&self, message: &str) -> Result<()> {
        self.service.notify("show_message", Some(message), None).await
    }

    /// Ask the user of the main window; `None` when they dismissed the prompt.
    pub async fn prompt(&self, message: &str) -> Result<Option<String>> {
        self.service.call("prompt", Some(message), None).await
    }

    pub async fn set_status(&self, status: &str, window: &Window) -> Result<()> {
        self.service.notify("set_status", Some(status), Some(window)).await
    }
}
