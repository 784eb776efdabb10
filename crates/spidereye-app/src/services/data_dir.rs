// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory resolution.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Name of the bridge configuration file inside the data directory.
pub const CONFIG_FILE: &str = "bridge.json";

/// Return the application data directory, creating it if needed.
///
/// `SPIDEREYE_DATA_DIR` overrides the conventional location.
pub fn data_dir() -> PathBuf {
    let dir = match std::env::var_os("SPIDEREYE_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => base_dir().join("spidereye"),
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(path = %dir.display(), error = %e, "cannot create data directory");
    }
    dir
}

/// Path of the bridge configuration file in `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

fn base_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lives_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(config_path(dir.path()), dir.path().join("bridge.json"));
    }
}
