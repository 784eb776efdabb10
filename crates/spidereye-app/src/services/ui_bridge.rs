// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host operations exposed to the page as `UiBridge.*`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spidereye_bridge::{BridgeObject, HandlerResult, MethodTable};
use spidereye_core::UserFacingError;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Payload of `UiBridge.getSomeData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomeDataModel {
    pub text: String,
    pub number: u32,
}

/// Argument of `UiBridge.power`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PowerModel {
    pub value: f64,
    pub power: f64,
}

#[derive(Debug, Error)]
#[error("intentional failure from the host")]
pub struct IntentionalError;

/// Scoped handler: one instance per page call.
pub struct UiBridge {
    instance_id: String,
    long_procedure: Duration,
}

impl UiBridge {
    pub fn new(long_procedure: Duration) -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
            long_procedure,
        }
    }

    fn some_data(&self) -> SomeDataModel {
        SomeDataModel {
            text: "Hello World".into(),
            number: (Uuid::new_v4().as_u128() % 100) as u32,
        }
    }
}

impl BridgeObject for UiBridge {
    fn register_methods(methods: &mut MethodTable<Self>) {
        methods
            .method("get_some_data", |ui, ()| Ok(ui.some_data()))
            .method("get_instance_id", |ui, ()| Ok(ui.instance_id.clone()))
            .method("power", |_, model: PowerModel| Ok(model.value.powf(model.power)))
            .method("produce_error", |_, ()| -> HandlerResult<()> { Err(IntentionalError.into()) })
            .method("produce_friendly_error", |_, ()| -> HandlerResult<()> {
                Err(UserFacingError::new(
                    "The demo refused on purpose.",
                    "produce_friendly_error always fails",
                )
                .into())
            })
            .method("run_long_procedure", |ui, ()| {
                std::thread::sleep(ui.long_procedure);
                Ok(())
            })
            .method_async("run_long_procedure_on_task", |ui, ()| async move {
                tokio::time::sleep(ui.long_procedure).await;
                info!(instance = %ui.instance_id, "long procedure finished");
                Ok(())
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spidereye_bridge::stub::StubWebview;
    use spidereye_bridge::{GlobalHandlers, ServiceCollection, WebviewBridge};
    use std::sync::Arc;

    async fn page_with_ui_bridge() -> (StubWebview, Arc<WebviewBridge>) {
        let mut services = ServiceCollection::new();
        services.add_bridge_scoped(|_| Ok(UiBridge::new(Duration::from_millis(5))));
        let page = StubWebview::new();
        let bridge = WebviewBridge::builder(Arc::new(page.clone()))
            .global_handlers(Arc::new(GlobalHandlers::new()))
            .services(services.build())
            .build()
            .unwrap();
        (page, bridge)
    }

    #[tokio::test]
    async fn some_data_and_power() {
        let (page, _bridge) = page_with_ui_bridge().await;

        let data = page.call_api("UiBridge.getSomeData", None).await;
        let model: SomeDataModel = serde_json::from_value(data.value.unwrap()).unwrap();
        assert_eq!(model.text, "Hello World");
        assert!(model.number < 100);

        let power = page.call_api("UiBridge.power", Some(r#"{"value":2,"power":10}"#)).await;
        assert_eq!(power.value, Some(json!(1024.0)));
    }

    #[tokio::test]
    async fn each_call_gets_a_fresh_instance() {
        let (page, _bridge) = page_with_ui_bridge().await;
        let first = page.call_api("UiBridge.getInstanceId", None).await.value;
        let second = page.call_api("UiBridge.getInstanceId", None).await.value;
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn errors_reach_the_page() {
        let (page, _bridge) = page_with_ui_bridge().await;

        let plain = page.call_api("UiBridge.produceError", None).await;
        assert!(!plain.success);
        assert_eq!(plain.error.as_deref(), Some("intentional failure from the host"));
        assert_eq!(plain.error_type_name.as_deref(), Some("IntentionalError"));
        assert!(!plain.is_ui_friendly_error);

        let friendly = page.call_api("UiBridge.produceFriendlyError", None).await;
        assert!(friendly.is_ui_friendly_error);
        assert_eq!(friendly.error.as_deref(), Some("The demo refused on purpose."));
    }

    #[tokio::test]
    async fn long_procedures_complete_without_value() {
        let (page, _bridge) = page_with_ui_bridge().await;
        for id in ["UiBridge.runLongProcedure", "UiBridge.runLongProcedureOnTask"] {
            let result = page.call_api(id, None).await;
            assert!(result.success, "{id} failed: {:?}", result.error);
            assert_eq!(result.value, None);
        }
    }
}
