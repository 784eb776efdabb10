// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SpiderEye core: types, wire models and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod models;
pub mod types;
pub mod ui_errors;

pub use config::BridgeConfig;
pub use error::{BridgeError, HandlerError, ScriptError};
pub use models::{ApiResult, EventError, EventResult, InvokeInfo};
pub use types::*;
pub use ui_errors::{UiFriendlyError, UiFriendlyResultExt, UserFacingError, register_ui_friendly};
