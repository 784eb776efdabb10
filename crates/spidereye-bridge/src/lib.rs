// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SpiderEye bridge: RPC between host code and the page running in a webview.
//
// The page calls host operations registered on a `WebviewBridge` (see
// `registry`), and the host calls page handlers either directly through
// `WebviewBridge::invoke_remote` or through a `ClientService`. Native
// webviews plug in through the `Webview` trait; `stub::StubWebview` is the
// headless implementation used on CI and in tests.

pub mod bridge;
pub mod client;
pub mod codec;
pub mod di;
pub mod diagnostics;
pub mod error_mapper;
pub mod global;
pub mod registry;
pub mod script;
pub mod stub;
pub mod traits;
pub mod windows;

pub use bridge::{BridgeBuilder, BridgeEvent, WebviewBridge};
pub use client::{ClientInterface, ClientMethod, ClientService};
pub use codec::{JsonCodec, JsonCodecExt, SerdeJsonCodec};
pub use di::{Scope, ServiceCollection, ServiceProvider};
pub use diagnostics::Diagnostics;
pub use error_mapper::{
    DefaultErrorMapper, ErrorMapper, error_mapper, reset_error_mapper, set_error_mapper,
};
pub use global::GlobalHandlers;
pub use registry::{ApiMethod, ApiRegistry, BridgeObject, HandlerResult, MethodTable};
pub use traits::{MessageHandler, Webview};
pub use windows::{Window, WindowCollection};
