// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application services: the host API the page calls, the page API the host
// calls, and where the application keeps its files.

pub mod data_dir;
pub mod ui_bridge;
pub mod ui_client;
