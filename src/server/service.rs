// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-connection service loop: read frames off the wire and spawn
//! one dispatch worker per RPC request. The loop exits, draining its
//! in-flight dispatch workers, on any read error including an idle
//! timeout.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::Registry;
use crate::server::connection::{ConnectionContext, InFlightGuard};
use crate::server::session::SessionHandle;
use crate::wire::{FrameError, MessageType, RequestEnvelope, read_frame};

/// Reads frames from `reader` until the connection closes, the server
/// starts halting, or the read errors out, spawning a dispatch worker
/// per request. An idle `io_deadline` alone does not end the loop: the
/// connection is meant to survive long idle stretches, so a timeout
/// only closes it once `shutdown` has fired. Returns once the read side
/// is exhausted; the caller is responsible for marking the session
/// unoccupied afterwards.
pub async fn run<R, W>(
    registry: Registry,
    session: Arc<SessionHandle>,
    connection: Arc<ConnectionContext<W>>,
    mut reader: R,
    io_deadline: std::time::Duration,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("service loop shutting down");
                return;
            }
            result = read_frame(&mut reader, io_deadline) => {
                match result {
                    Ok(frame) => frame,
                    Err(FrameError::Timeout(_)) if shutdown.is_cancelled() => {
                        debug!("connection idle past deadline during shutdown, closing");
                        return;
                    }
                    Err(FrameError::Timeout(_)) => {
                        debug!("connection idle past deadline, continuing to wait for traffic");
                        continue;
                    }
                    Err(e) => {
                        debug!("service loop ending: {e}");
                        return;
                    }
                }
            }
        };

        if frame.message_type != MessageType::Rpc {
            warn!("unexpected handshake frame mid-stream, ignoring");
            continue;
        }

        let request: RequestEnvelope = match serde_json::from_slice(&frame.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("malformed request envelope: {e}");
                continue;
            },
        };

        let registry = registry.clone();
        let session = Arc::clone(&session);
        let connection = Arc::clone(&connection);
        tokio::spawn(async move {
            let _guard = InFlightGuard::acquire(Arc::clone(&session)).await;
            crate::server::dispatch::handle_request(&registry, &session, &connection, request)
                .await;
        });
    }
}
