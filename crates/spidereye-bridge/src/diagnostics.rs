// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sink for failures that have no caller to return to.
//
// Inbound message handling runs detached from whatever native callback
// delivered the message, so its errors are logged here and fanned out to any
// subscriber (tests, an application-level crash reporter).

use std::sync::{Arc, LazyLock};

use spidereye_core::types::InternalError;
use tokio::sync::broadcast;
use tracing::error;

const DEFAULT_CAPACITY: usize = 256;

static SHARED: LazyLock<Arc<Diagnostics>> =
    LazyLock::new(|| Arc::new(Diagnostics::new(DEFAULT_CAPACITY)));

#[derive(Debug)]
pub struct Diagnostics {
    tx: broadcast::Sender<InternalError>,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Process-wide sink used by bridges that were not given their own.
    pub fn shared() -> Arc<Self> {
        SHARED.clone()
    }

    pub fn report(&self, record: InternalError) {
        error!(occurred_at = %record.occurred_at, "{record}");
        // No receivers is fine; the log line above is the record of last resort.
        let _ = self.tx.send(record);
    }

    pub fn report_message(&self, message: impl Into<String>, error: Option<String>) {
        self.report(InternalError::new(message, error));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InternalError> {
        self.tx.subscribe()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_reports() {
        let diagnostics = Diagnostics::new(4);
        let mut rx = diagnostics.subscribe();
        diagnostics.report_message("No callback for eventCallback", Some("id 3".into()));

        let record = rx.recv().await.unwrap();
        assert_eq!(record.message, "No callback for eventCallback");
        assert_eq!(record.error.as_deref(), Some("id 3"));
    }

    #[test]
    fn report_without_subscribers_does_not_fail() {
        Diagnostics::new(1).report_message("nobody listening", None);
    }
}
