// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The two trim cadences: a short ACK-based pass and a long
//! TTL-based pass, each running on its own [`tokio::time::interval`].

use std::sync::Arc;

use tokio::time::interval;
use tracing::debug;

use crate::server::server::Server;

/// Runs both trim passes on their configured cadences until `server`
/// shuts down. Intended to be spawned once per running server.
pub async fn run(server: Arc<Server>) {
    let mut short_tick = interval(server.short_trim());
    let mut long_tick = interval(server.long_trim());
    let shutdown = server.shutdown_token();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("trim daemon shutting down");
                return;
            }
            _ = short_tick.tick() => trim_acked(&server).await,
            _ = long_tick.tick() => trim_expired(&server).await,
        }
    }
}

async fn trim_acked(server: &Arc<Server>) {
    let mut total = 0;
    for entry in server.sessions().iter() {
        total += entry.value().state.lock().await.trim_acked();
    }
    if total > 0 {
        debug!("ACK-based trim removed {total} completed replies");
    }
}

async fn trim_expired(server: &Arc<Server>) {
    let ttl = server.completed_long_ttl();
    let mut total = 0;
    for entry in server.sessions().iter() {
        total += entry.value().state.lock().await.trim_expired(ttl);
    }
    if total > 0 {
        debug!("TTL-based trim removed {total} completed replies");
    }

    prune_empty_sessions(server).await;
}

/// Removes sessions that are both empty (no cached replies left to
/// serve a retransmit) and not currently owned by a live connection.
async fn prune_empty_sessions(server: &Arc<Server>) {
    let mut dead = Vec::new();
    for entry in server.sessions().iter() {
        let guard = entry.value().state.lock().await;
        if !guard.occupied && guard.in_flight == 0 && guard.is_empty() {
            dead.push(entry.key().clone());
        }
    }
    let count = dead.len();
    for id in dead {
        server.sessions().remove(&id);
    }
    if count > 0 {
        debug!("pruned {count} empty sessions");
    }
}
