// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors that carry a message safe to show in the page UI.
//
// A handler error flagged as UI-friendly reaches the page with
// `isUiFriendlyError: true` and the user-facing text in place of the raw
// technical message.

use std::any::TypeId;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{LazyLock, PoisonError, RwLock};

use thiserror::Error;

use crate::error::{BridgeError, HandlerError};

/// Capability of an error to describe itself to an end user.
///
/// A handler error carrying this capability is flagged UI-friendly when it is
/// converted with [`UiFriendlyResultExt::ui_friendly`] or
/// [`HandlerError::ui_friendly`]. Types passed to [`register_ui_friendly`]
/// are also detected on the plain `?` path, anywhere in the cause chain.
pub trait UiFriendlyError {
    /// Readable message that can be shown in the UI as-is.
    fn ui_message(&self) -> String;
}

type UiMessageFn = fn(&(dyn StdError + 'static)) -> Option<String>;

static DETECTORS: LazyLock<RwLock<HashMap<TypeId, UiMessageFn>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Let `?` recognise `E` as UI-friendly without an explicit conversion.
pub fn register_ui_friendly<E>()
where
    E: StdError + UiFriendlyError + 'static,
{
    let detect: UiMessageFn = |err: &(dyn StdError + 'static)| {
        err.downcast_ref::<E>().map(UiFriendlyError::ui_message)
    };
    DETECTORS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(TypeId::of::<E>(), detect);
}

/// UI message of `err` itself, ignoring its causes.
pub(crate) fn ui_message_of(err: &(dyn StdError + 'static)) -> Option<String> {
    if let Some(friendly) = err.downcast_ref::<UserFacingError>() {
        return Some(friendly.ui_message.clone());
    }
    DETECTORS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .find_map(|detect| detect(err))
}

/// Convert a failure into a UI-friendly [`HandlerError`].
pub trait UiFriendlyResultExt<T> {
    fn ui_friendly(self) -> Result<T, HandlerError>;
}

impl<T, E> UiFriendlyResultExt<T> for Result<T, E>
where
    E: StdError + UiFriendlyError + Send + Sync + 'static,
{
    fn ui_friendly(self) -> Result<T, HandlerError> {
        self.map_err(HandlerError::ui_friendly)
    }
}

/// Ready-made UI-friendly error for handlers.
///
/// `Display` prints the technical detail; the UI message is what the page shows.
/// Detected automatically when converted into a `HandlerError` with `?`, also
/// when it is the cause of another error.
#[derive(Debug, Clone, Error)]
#[error("{detail}")]
pub struct UserFacingError {
    pub ui_message: String,
    pub detail: String,
}

impl UserFacingError {
    pub fn new(ui_message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            ui_message: ui_message.into(),
            detail: detail.into(),
        }
    }
}

impl UiFriendlyError for UserFacingError {
    fn ui_message(&self) -> String {
        self.ui_message.clone()
    }
}

impl UiFriendlyError for BridgeError {
    fn ui_message(&self) -> String {
        match self {
            BridgeError::MissingClientMethodImplementation { .. } => {
                "This page doesn't support that action yet.".into()
            }
            BridgeError::Script(err) => format!("The page reported a problem: {}", err.message()),
            BridgeError::ScriptExecution(_) => "The page couldn't run the request.".into(),
            BridgeError::CallAborted { .. } => {
                "The page was closed or reloaded before it could answer.".into()
            }
            BridgeError::CallTimedOut { .. } => "The page took too long to answer.".into(),
            BridgeError::NoWindow => "There is no open window to show this in.".into(),
            BridgeError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                "The file couldn't be found.".into()
            }
            BridgeError::Io(_) => "A file couldn't be read or written.".into(),
            _ => "Something went wrong inside the application.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;

    #[test]
    fn bridge_errors_have_plain_messages() {
        let err = BridgeError::CallTimedOut {
            id: "Ui.prompt".into(),
            call_id: 4,
            after_ms: 500,
        };
        assert_eq!(err.ui_message(), "The page took too long to answer.");
    }

    #[derive(Debug, Error)]
    #[error("quota table locked by job 17")]
    struct QuotaLocked;

    impl UiFriendlyError for QuotaLocked {
        fn ui_message(&self) -> String {
            "Your quota is being recalculated, try again shortly.".into()
        }
    }

    #[derive(Debug, Error)]
    #[error("disk quota exceeded on /var/cache")]
    struct DiskFull;

    impl UiFriendlyError for DiskFull {
        fn ui_message(&self) -> String {
            "The disk is full.".into()
        }
    }

    #[derive(Debug, Error)]
    #[error("saving failed")]
    struct SaveFailed(#[source] DiskFull);

    #[test]
    fn result_extension_flags_custom_errors() {
        let err = Err::<(), _>(QuotaLocked).ui_friendly().unwrap_err();
        assert!(err.is_ui_friendly());
        assert_eq!(err.ui_message(), Some("Your quota is being recalculated, try again shortly."));
        assert_eq!(err.message(), "quota table locked by job 17");
    }

    #[test]
    fn registered_errors_are_found_through_question_mark() {
        fn save() -> Result<(), HandlerError> {
            Err(SaveFailed(DiskFull))?;
            Ok(())
        }
        register_ui_friendly::<DiskFull>();
        let err = save().unwrap_err();
        assert!(err.is_ui_friendly());
        assert_eq!(err.ui_message(), Some("The disk is full."));
        assert_eq!(err.type_name(), "SaveFailed");
    }

    #[test]
    fn ui_friendly_constructor_flags_bridge_errors() {
        let err = HandlerError::ui_friendly(BridgeError::NoWindow);
        assert!(err.is_ui_friendly());
        assert_eq!(err.ui_message(), Some("There is no open window to show this in."));
        assert_eq!(err.message(), "no open window to call into");
    }
}
