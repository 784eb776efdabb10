// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the SpiderEye bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id of a host→page call, echoed back by the page.
pub type CallId = u64;

/// Unique identifier for an open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which windows a client method call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallMode {
    /// Only the first opened window that is still open.
    #[default]
    MainWindow,
    /// A single window, passed as the trailing argument of the call.
    SingleWindow,
    /// Every open window in opening order. The last window's result is returned.
    Broadcast,
}

impl CallMode {
    /// Allowed parameter count (inclusive) for a client method using this mode.
    /// The window argument of `SingleWindow` counts as a parameter.
    pub fn parameter_range(&self) -> (usize, usize) {
        match self {
            Self::SingleWindow => (1, 2),
            Self::MainWindow | Self::Broadcast => (0, 1),
        }
    }
}

/// What to do when the page has no handler for a host→page call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingMethodBehavior {
    /// Notify subscribers and resolve with the no-subscriber result.
    #[default]
    Report,
    /// Resolve with the no-subscriber result, nothing else.
    Ignore,
    /// Fail the call with `MissingClientMethodImplementation`.
    Throw,
}

/// A failure that had nobody to report to, e.g. an orphaned callback id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalError {
    pub message: String,
    /// Display form of the underlying error, if there was one.
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl InternalError {
    pub fn new(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            message: message.into(),
            error,
            occurred_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(err) => write!(f, "{}: {}", self.message, err),
            None => f.write_str(&self.message),
        }
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `alloc::vec::Vec<u8>` becomes `Vec`, `my_app::UiBridge` becomes `UiBridge`.
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Convert a host method name to the page's naming convention (camelCase).
///
/// Accepts `snake_case` and `PascalCase` input: `get_some_data` and
/// `GetSomeData` both become `getSomeData`.
pub fn normalize_to_js_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if out.is_empty() {
            out.extend(ch.to_lowercase());
        } else if upper_next {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        upper_next = false;
    }
    out
}
