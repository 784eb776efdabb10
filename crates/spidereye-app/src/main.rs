// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SpiderEye playground
//
// Entry point. Loads the bridge configuration, initialises logging and runs
// the headless playground against the process-wide handler registry.

mod demo;
mod services;

use spidereye_bridge::GlobalHandlers;
use spidereye_core::BridgeConfig;
use tracing_subscriber::EnvFilter;

use services::data_dir;

#[tokio::main]
async fn main() {
    let dir = data_dir::data_dir();
    let config = BridgeConfig::load_or_default(data_dir::config_path(&dir));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(data_dir = %dir.display(), "SpiderEye playground starting");

    match demo::run(&config, GlobalHandlers::shared()).await {
        Ok(report) => tracing::info!(
            title = ?report.title,
            data = ?report.some_data.value,
            power = ?report.power.value,
            error = ?report.error.error,
            answer = ?report.prompt_answer,
            messages = report.messages_shown,
            "playground completed"
        ),
        Err(e) => {
            tracing::error!(error = %e, "playground failed");
            std::process::exit(1);
        }
    }
}
