// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion of handler failures into the `ApiResult` sent to the page.

use std::sync::{Arc, LazyLock, RwLock};

use spidereye_core::error::HandlerError;
use spidereye_core::models::ApiResult;

/// Turns a handler error into a failed `ApiResult`.
pub trait ErrorMapper: Send + Sync {
    fn map_error(&self, error: &HandlerError) -> ApiResult;
}

/// Message, type names and detail; the UI message replaces the raw message
/// when the error is UI-friendly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMapper;

impl ErrorMapper for DefaultErrorMapper {
    fn map_error(&self, error: &HandlerError) -> ApiResult {
        let message = error.ui_message().unwrap_or(error.message());
        ApiResult {
            value: None,
            success: false,
            error: Some(message.to_string()),
            error_type_name: Some(error.type_name().to_string()),
            error_type_full_name: Some(error.full_type_name().to_string()),
            is_ui_friendly_error: error.is_ui_friendly(),
            error_detail: Some(error.detail().to_string()),
        }
    }
}

static MAPPER: LazyLock<RwLock<Arc<dyn ErrorMapper>>> =
    LazyLock::new(|| RwLock::new(Arc::new(DefaultErrorMapper)));

/// Mapper used by every bridge without its own override.
pub fn error_mapper() -> Arc<dyn ErrorMapper> {
    match MAPPER.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Replace the process-wide mapper.
pub fn set_error_mapper(mapper: Arc<dyn ErrorMapper>) {
    match MAPPER.write() {
        Ok(mut guard) => *guard = mapper,
        Err(poisoned) => *poisoned.into_inner() = mapper,
    }
}

pub fn reset_error_mapper() {
    set_error_mapper(Arc::new(DefaultErrorMapper));
}
