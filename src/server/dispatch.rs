// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-request dispatch worker: dedup against the completed cache,
//! invoke the registered handler on a miss, cache the result, write the
//! reply. An unregistered method name replies with the fixed
//! [`crate::error::METHOD_NOT_FOUND`] sentinel rather than a free-form
//! error string.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::registry::{HandlerOutcome, Registry};
use crate::server::connection::ConnectionContext;
use crate::server::session::SessionHandle;
use crate::wire::{ReplyEnvelope, RequestEnvelope};

/// Handles one decoded [`RequestEnvelope`]: looks it up in the
/// completed-reply cache, runs the handler on a miss, caches the
/// outcome, and writes the reply frame.
pub async fn handle_request<W>(
    registry: &Registry,
    session: &Arc<SessionHandle>,
    connection: &ConnectionContext<W>,
    request: RequestEnvelope,
) where
    W: AsyncWrite + Unpin,
{
    let cached = {
        let mut guard = session.state.lock().await;
        guard.advance_watermark(request.highest_reply_seen);
        guard.completed_reply(request.request_id)
    };

    let reply = match cached {
        Some(reply) => {
            debug!(
                "request {} for {} served from completed cache",
                request.request_id, request.my_unique_id
            );
            reply
        },
        None => {
            let outcome = registry.dispatch(&request.method, request.params).await;
            let reply = match outcome {
                HandlerOutcome::Ok(result) => ReplyEnvelope {
                    my_unique_id: request.my_unique_id.clone(),
                    request_id: request.request_id,
                    result,
                    err_str: String::new(),
                },
                HandlerOutcome::Error(err_str) => ReplyEnvelope {
                    my_unique_id: request.my_unique_id.clone(),
                    request_id: request.request_id,
                    result: serde_json::Value::Null,
                    err_str,
                },
            };

            let mut guard = session.state.lock().await;
            guard.record_completed(reply.clone());
            reply
        },
    };

    let payload = match serde_json::to_vec(&reply) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("failed to serialize reply for request {}: {e}", request.request_id);
            return;
        },
    };

    if let Err(e) = connection.write_reply(&payload).await {
        warn!("failed to write reply for request {}: {e}", request.request_id);
    }
}
