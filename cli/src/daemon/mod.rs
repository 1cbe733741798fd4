// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Serving the HTTP API in the foreground
//! - Health checks from the operator CLI

use anyhow::Result;

pub mod client;
pub mod server;

pub use client::DaemonClient;
pub use server::{start_daemon, ServeOptions};

/// Port the daemon listens on when neither config nor flags say otherwise.
pub const DEFAULT_PORT: u16 = 8400;

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { uptime: Option<u64>, version: Option<String> },
    Stopped { reason: String },
}

/// Check whether a daemon answers its health endpoint.
pub async fn check_daemon_running(client: &DaemonClient) -> Result<DaemonStatus> {
    match client.health().await {
        Ok(body) => Ok(DaemonStatus::Running {
            uptime: body["uptime_seconds"].as_u64(),
            version: body["version"].as_str().map(str::to_string),
        }),
        Err(e) => Ok(DaemonStatus::Stopped {
            reason: format!("{:#}", e),
        }),
    }
}
