// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

use crate::wire::FrameError;

/// The sentinel reported when a client calls an unregistered method name.
///
/// Distinct from a transport error: the server still caches this reply so
/// a retransmit of the same request sees the same answer.
pub const METHOD_NOT_FOUND: &str = "retryrpc: method not found";

/// Errors recovered locally by reconnecting; never surfaced to a handler
/// or to the caller of [`crate::Client::send`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("connection closed while waiting for a reply")]
    Cancelled,

    #[error("reconnecting to server")]
    Reconnecting,
}

/// The error type returned by [`crate::Client::send`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed; the caller's request is still queued for
    /// resend and will be retried transparently on reconnect. This
    /// variant is only returned once the client itself has given up
    /// (e.g. on [`crate::Client::close`]), not on every transient error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handler ran and returned an error. Idempotent across retries:
    /// every retransmit of the same request ID gets this exact message
    /// back, since the server caches the completed reply.
    #[error("{0}")]
    Handler(String),

    /// The client has been closed and no longer accepts new requests.
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    /// True if this is the stable not-found sentinel rather than a
    /// handler-produced error message.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Handler(msg) if msg == METHOD_NOT_FOUND)
    }
}
