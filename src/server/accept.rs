// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The accept loop and reconnect-takeover handoff.
//!
//! Accept a TCP connection, read the handshake PassID frame, then
//! either create a fresh session or wait for the prior connection under
//! the same identifier to fully drain before taking it over, via a
//! `tokio::sync::Notify` wait on [`Session::prior_exited`].

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::registry::ClientIdentifier;
use crate::server::connection::ConnectionContext;
use crate::server::server::Server;
use crate::server::session::SessionHandle;
use crate::wire::{MessageType, PassId, read_frame};

/// Accepts connections on `listener` until `server`'s shutdown token
/// fires, spawning one handler task per accepted connection.
pub async fn run(server: Arc<Server>, listener: TcpListener, acceptor: TlsAcceptor) {
    let shutdown_token = server.shutdown_token();
    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("accept loop shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&server);
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(server, acceptor, stream).await {
                                warn!("connection from {peer} ended: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
        }
    }
}

async fn handle_connection(
    server: Arc<Server>,
    acceptor: TlsAcceptor,
    stream: TcpStream,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let tls_stream = acceptor.accept(stream).await?;
    let (mut reader, writer) = tokio::io::split(tls_stream);

    let handshake = read_frame(&mut reader, server.io_deadline()).await?;
    if handshake.message_type != MessageType::PassId {
        anyhow::bail!("expected handshake frame, got {:?}", handshake.message_type);
    }
    let PassId(client_id) = serde_json::from_slice(&handshake.payload)?;

    let session = get_session_and_wait(&server, &client_id).await;

    let connection = Arc::new(ConnectionContext::new(writer, server.io_deadline()));
    let connection_id = server.register_connection(Arc::clone(&connection) as Arc<_>);
    info!("client {client_id} connected");

    crate::server::service::run(
        server.registry().clone(),
        Arc::clone(&session),
        connection,
        reader,
        server.io_deadline(),
        server.shutdown_token(),
    )
    .await;

    server.unregister_connection(connection_id);

    let mut guard = session.state.lock().await;
    guard.occupied = false;
    let should_notify = guard.in_flight == 0;
    drop(guard);
    if should_notify {
        session.prior_exited.notify_waiters();
    }
    info!("client {client_id} disconnected");

    Ok(())
}

/// Looks up or creates the session for `client_id`. If a prior
/// connection still owns it, waits for that connection's service loop
/// and all its in-flight dispatch workers to finish before taking over.
///
/// The `notified()` future is created *before* the occupancy check so a
/// notification fired between the check and the wait is never missed,
/// per `tokio::sync::Notify`'s documented usage pattern.
async fn get_session_and_wait(
    server: &Arc<Server>,
    client_id: &ClientIdentifier,
) -> Arc<SessionHandle> {
    loop {
        let session = server
            .sessions()
            .entry(client_id.clone())
            .or_insert_with(|| Arc::new(SessionHandle::new()))
            .clone();

        let notified = session.prior_exited.notified();
        {
            let mut guard = session.state.lock().await;
            if !guard.occupied && guard.in_flight == 0 {
                guard.occupied = true;
                return Arc::clone(&session);
            }
        }
        notified.await;
    }
}
