// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Headless playground: two stub windows exercise both directions of the
// bridge the way a real page would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;
use spidereye_bridge::script::{PostTarget, bootstrap_script};
use spidereye_bridge::stub::StubWebview;
use spidereye_bridge::{
    BridgeEvent, Diagnostics, GlobalHandlers, ServiceCollection, WebviewBridge, WindowCollection,
};
use spidereye_core::error::Result;
use spidereye_core::{ApiResult, BridgeConfig};
use tracing::{debug, info, warn};

use crate::services::ui_bridge::UiBridge;
use crate::services::ui_client::UiClient;

const TITLE: &str = "SpiderEye Playground";

/// What the playground observed, for the log and for tests.
#[derive(Debug, Clone)]
pub struct DemoReport {
    pub title: Option<String>,
    pub some_data: ApiResult,
    pub power: ApiResult,
    pub error: ApiResult,
    pub prompt_answer: Option<String>,
    pub messages_shown: usize,
}

/// Run the playground against `globals`, opening and closing two windows.
pub async fn run(config: &BridgeConfig, globals: Arc<GlobalHandlers>) -> Result<DemoReport> {
    let mut services = ServiceCollection::new();
    services.add_scoped(|_| Ok(UiBridge::new(Duration::from_millis(50))));
    let provider = services.build();
    if let Err(e) = globals.add_type::<UiBridge>() {
        debug!(error = %e, "UiBridge already registered globally");
    }

    let bootstrap = bootstrap_script(&PostTarget::WebKit, config.convert_payload_to_json);
    debug!(bytes = bootstrap.len(), "page runtime bootstrap prepared");

    let diagnostics = Arc::new(Diagnostics::new(config.diagnostic_capacity));
    let windows = WindowCollection::new();
    let shown = Arc::new(AtomicUsize::new(0));

    let mut pages = Vec::new();
    for index in 0..2 {
        let page = if config.convert_payload_to_json {
            StubWebview::with_string_envelopes()
        } else {
            StubWebview::new()
        };
        let counter = shown.clone();
        page.add_event_handler("UiBridgeClientService.showMessage", move |data: Value| {
            info!(window = index, message = %data, "page shows message");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
        page.add_event_handler("UiBridgeClientService.prompt", |_| {
            Ok(Some(Value::from("SpiderEye")))
        });

        let bridge = WebviewBridge::builder(Arc::new(page.clone()))
            .config(config.clone())
            .services(provider.clone())
            .global_handlers(globals.clone())
            .diagnostics(diagnostics.clone())
            .build()?;
        pages.push((page, windows.open(bridge)));
    }

    let (main_page, main_window) = &pages[0];
    let mut events = main_window.bridge().subscribe();
    main_page.update_title(TITLE);
    let title = match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
        Ok(Ok(BridgeEvent::TitleChanged(title))) => Some(title),
        other => {
            warn!(?other, "no title notification");
            None
        }
    };

    let some_data = main_page.call_api("UiBridge.getSomeData", None).await;
    let power = main_page
        .call_api("UiBridge.power", Some(r#"{"value":2,"power":8}"#))
        .await;
    let error = main_page.call_api("UiBridge.produceError", None).await;
    info!(
        data = ?some_data.value,
        power = ?power.value,
        error = ?error.error,
        "page calls answered"
    );

    let client = UiClient::new(windows.clone())?;
    client.set_status("ready", main_window).await?;
    client.show_message("Hello from the host").await?;
    let prompt_answer = client.prompt("What's your name?").await?;
    info!(answer = ?prompt_answer, "prompt answered");

    for (_, window) in &pages {
        windows.remove(window.id());
    }
    info!(all_closed = windows.all_closed(), "playground finished");

    Ok(DemoReport {
        title,
        some_data,
        power,
        error,
        prompt_answer,
        messages_shown: shown.load(Ordering::SeqCst),
    })
}
