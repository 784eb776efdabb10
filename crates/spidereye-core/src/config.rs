// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Settings shared by every bridge of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Give up on a host → page call after this many milliseconds.
    /// `None` waits until the page answers or the call is aborted.
    pub call_timeout_ms: Option<u64>,
    /// Buffer size of the title / missing-implementation notification channel.
    pub event_capacity: usize,
    /// Buffer size of the internal diagnostics channel.
    pub diagnostic_capacity: usize,
    /// Whether the page runtime stringifies envelopes before posting them
    /// (needed where the native message channel only carries strings).
    pub convert_payload_to_json: bool,
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: None,
            event_capacity: 64,
            diagnostic_capacity: 256,
            convert_payload_to_json: true,
            log_filter: "info".into(),
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file. Missing keys take their default value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.as_ref().display(), "bridge config loaded");
        Ok(config)
    }

    /// Like [`load`](Self::load) but falls back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                let path = path.as_ref().display();
                warn!(path = %path, error = %e, "invalid bridge config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(BridgeError::Config("event_capacity must be at least 1".into()));
        }
        if self.diagnostic_capacity == 0 {
            return Err(BridgeError::Config("diagnostic_capacity must be at least 1".into()));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(BridgeError::Config("call_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{ "call_timeout_ms": 1500 }"#).unwrap();

        let config = BridgeConfig::load(&path).expect("load");
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.event_capacity, 64);
        assert!(config.convert_payload_to_json);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        let config = BridgeConfig {
            log_filter: "spidereye_bridge=debug".into(),
            ..BridgeConfig::default()
        };
        config.save(&path).expect("save");
        assert_eq!(BridgeConfig::load(&path).expect("load"), config);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{ "event_capacity": 0 }"#).unwrap();
        assert!(matches!(BridgeConfig::load(&path), Err(BridgeError::Config(_))));
        assert_eq!(BridgeConfig::load_or_default(&path), BridgeConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BridgeConfig::load_or_default(dir.path().join("absent.json"));
        assert_eq!(config, BridgeConfig::default());
    }
}
