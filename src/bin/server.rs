// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use retryrpc_rs::cfg::config::ServerConfig;
use retryrpc_rs::cfg::logger::init_logger;
use retryrpc_rs::registry::Registry;
use retryrpc_rs::server::server::Server;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Deserialize)]
struct PingRequest {
    message: String,
}

#[derive(Serialize)]
struct PingReply {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger("config/logger.yaml")?;

    let cfg = ServerConfig::load_from_file("config/server.yaml")
        .context("failed to load server config")?;

    let registry = Registry::new();
    registry.register("Ping", |req: PingRequest| async move {
        Ok::<_, String>(PingReply {
            message: format!("pong {} bytes", req.message.len()),
        })
    });

    let server = Server::new(cfg, registry).context("failed to build server")?;
    info!("retryrpc server starting on {}", server.bind_addr());

    server.run().await.context("server run loop failed")
}
