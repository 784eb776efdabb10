// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for SpiderEye.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::types::short_type_name;
use crate::ui_errors::ui_message_of;

/// Top-level error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Registration --
    #[error("Handler with name \"{0}\" already exists.")]
    DuplicateHandlerName(String),

    #[error("Method with name \"{0}\" already exists.")]
    DuplicateMethodName(String),

    #[error("cannot add handlers via type if dependency injection isn't enabled")]
    DependencyInjectionDisabled,

    #[error("no service registered for type {0}")]
    ServiceNotRegistered(String),

    // -- Client services --
    #[error("invalid client interface: {0}")]
    InvalidInterfaceShape(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("no open window to call into")]
    NoWindow,

    #[error("Client service with id \"{id}\" does not exist.")]
    MissingClientMethodImplementation { id: String },

    // -- Page side --
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("script execution failed: {0}")]
    ScriptExecution(String),

    #[error("call {call_id} to \"{id}\" was aborted before the page answered")]
    CallAborted { id: String, call_id: u64 },

    #[error("call {call_id} to \"{id}\" timed out after {after_ms} ms")]
    CallTimedOut { id: String, call_id: u64, after_ms: u64 },

    // -- Runtime / environment --
    #[error("no tokio runtime available to dispatch bridge work")]
    NoRuntime,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// An error reported by the page runtime while running a host-issued event.
///
/// When the page supplied a stack trace it is attached as a nested
/// `ScriptError` reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
    stack: Option<String>,
    #[source]
    inner: Option<Box<ScriptError>>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            inner: None,
        }
    }

    /// Error whose cause carries the page-side stack trace.
    pub fn with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: message.clone(),
            stack: None,
            inner: Some(Box::new(Self {
                message,
                stack: Some(stack.into()),
                inner: None,
            })),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The page stack trace, looked up on this error or its nested cause.
    pub fn stack(&self) -> Option<&str> {
        self.stack
            .as_deref()
            .or_else(|| self.inner.as_ref().and_then(|inner| inner.stack()))
    }
}

/// Error raised by a registered API handler.
///
/// Works like a boxed error: `?` converts any `std::error::Error` into it and
/// records the concrete type name for the error envelope sent to the page.
/// Does not implement `std::error::Error`; the blanket `From` below would
/// otherwise overlap with `From<T> for T`.
pub struct HandlerError {
    message: String,
    type_name: &'static str,
    detail: String,
    ui_message: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

/// Plain-text handler failure created through [`HandlerError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerMessage(pub String);

impl HandlerError {
    /// Wrap a concrete error, capturing its type name and cause chain.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<E>();
        let message = err.to_string();
        let detail = build_detail(type_name, &err);
        let ui_message = find_ui_message(&err);
        Self {
            message,
            type_name,
            detail,
            ui_message,
            source: Some(Box::new(err)),
        }
    }

    /// Wrap an error whose message is safe to show in the page UI.
    pub fn ui_friendly<E>(err: E) -> Self
    where
        E: StdError + crate::ui_errors::UiFriendlyError + Send + Sync + 'static,
    {
        let ui_message = err.ui_message();
        let mut wrapped = Self::new(err);
        wrapped.ui_message = Some(ui_message);
        wrapped
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(HandlerMessage(message.into()))
    }

    /// Handler task panicked; `payload` is the panic message if it had one.
    pub fn panicked(payload: Option<String>) -> Self {
        let message = match payload {
            Some(text) => format!("handler panicked: {text}"),
            None => "handler panicked".to_string(),
        };
        Self {
            detail: format!("panic: {message}"),
            message,
            type_name: "panic",
            ui_message: None,
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Short type name, e.g. `ParseIntError`.
    pub fn type_name(&self) -> &str {
        short_type_name(self.type_name)
    }

    /// Fully qualified type name, e.g. `core::num::error::ParseIntError`.
    pub fn full_type_name(&self) -> &str {
        self.type_name
    }

    /// Type name, message, cause chain and (when enabled) the backtrace.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn ui_message(&self) -> Option<&str> {
        self.ui_message.as_deref()
    }

    pub fn is_ui_friendly(&self) -> bool {
        self.ui_message.is_some()
    }

    pub fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Downcast the wrapped error.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_ref().and_then(|err| err.downcast_ref::<E>())
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("type_name", &self.type_name)
            .field("message", &self.message)
            .field("ui_message", &self.ui_message)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn build_detail(type_name: &str, err: &(dyn StdError + 'static)) -> String {
    let mut detail = format!("{type_name}: {err}");
    let mut cause = err.source();
    while let Some(inner) = cause {
        detail.push_str("\n ---> ");
        detail.push_str(&inner.to_string());
        cause = inner.source();
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        detail.push('\n');
        detail.push_str(&backtrace.to_string());
    }
    detail
}

/// Walk the cause chain looking for an error with a UI message.
fn find_ui_message(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(message) = ui_message_of(e) {
            return Some(message);
        }
        current = e.source();
    }
    None
}
