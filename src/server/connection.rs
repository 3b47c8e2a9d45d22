// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-connection write path and in-flight dispatch tracking.
//!
//! A `tokio::sync::Mutex`-guarded write half serializes concurrent reply
//! writes, and a guard type wrapping the session's `in_flight` counter,
//! notified through `Session::prior_exited`, lets a reconnecting client
//! wait for the previous connection's handlers to drain before taking
//! over.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::server::session::SessionHandle;
use crate::wire::MessageType;

/// The write half of one accepted connection, serialized behind a
/// mutex so the service loop and any concurrently-finishing dispatch
/// workers never interleave partial frames.
pub struct ConnectionContext<W> {
    writer: Mutex<W>,
    io_deadline: std::time::Duration,
}

impl<W> ConnectionContext<W>
where W: tokio::io::AsyncWrite + Unpin
{
    pub fn new(writer: W, io_deadline: std::time::Duration) -> Self {
        Self {
            writer: Mutex::new(writer),
            io_deadline,
        }
    }

    /// Writes one reply frame. Held under the write mutex for the
    /// duration, so two dispatch workers replying concurrently on the
    /// same connection never tear each other's frame.
    pub async fn write_reply(&self, payload: &[u8]) -> Result<(), crate::wire::FrameError> {
        let mut w = self.writer.lock().await;
        crate::wire::write_frame(&mut *w, MessageType::Rpc, payload, self.io_deadline).await
    }

    pub async fn shutdown(&self) {
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
    }
}

/// Type-erases a live connection's write half so `Server` can hold every
/// currently-accepted connection in one map, regardless of its concrete
/// stream type, and force-close any of them from `Server::close`.
pub trait ForceCloseable: Send + Sync {
    fn force_close(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<W> ForceCloseable for ConnectionContext<W>
where W: tokio::io::AsyncWrite + Unpin + Send + 'static
{
    fn force_close(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move { self.shutdown().await })
    }
}

/// RAII guard marking one dispatch worker as in-flight against
/// `session`. Decrements the counter on drop and, once it reaches zero
/// and the connection is no longer `occupied`, wakes anyone waiting on
/// `prior_exited`.
pub struct InFlightGuard {
    session: Arc<SessionHandle>,
}

impl InFlightGuard {
    pub async fn acquire(session: Arc<SessionHandle>) -> Self {
        session.state.lock().await.in_flight += 1;
        Self { session }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            let mut guard = session.state.lock().await;
            guard.in_flight = guard.in_flight.saturating_sub(1);
            let should_notify = guard.in_flight == 0 && !guard.occupied;
            drop(guard);
            if should_notify {
                session.prior_exited.notify_waiters();
            }
        });
    }
}
