// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The client runtime: connect, reconnect transparently across
//! transient TCP failures, and resend in-flight requests exactly once
//! each on the new connection so a non-idempotent handler never runs
//! twice for the same logical call.
//!
//! A reader/writer pair behind their own mutexes, a background read
//! loop spawned off an `Arc<Self>`, and a fixed I/O deadline on every
//! operation, keyed on `RequestID` rather than a connection-local
//! sequence number so outstanding calls survive a reconnect.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncWriteExt, ReadHalf, WriteHalf, split},
    net::TcpStream,
    sync::{Mutex, oneshot},
    time::sleep,
};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tracing::{debug, warn};

use crate::{
    cfg::config::ClientConfig,
    client::pending::AckWatermark,
    error::ClientError,
    registry::RequestId,
    tls::build_connector,
    wire::{MessageType, PassId, ReplyEnvelope, RequestEnvelope, read_frame, write_frame},
};

type SecureStream = TlsStream<TcpStream>;
type ReadHalfKind = ReadHalf<SecureStream>;
type WriteHalfKind = WriteHalf<SecureStream>;

/// The cap on how long the reconnect loop backs off between dial
/// attempts.
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

struct Outstanding {
    envelope: RequestEnvelope,
    reply_tx: oneshot::Sender<ReplyEnvelope>,
}

struct ClientInner {
    config: ClientConfig,
    connector: TlsConnector,
    next_request_id: AtomicU64,
    outstanding: Mutex<HashMap<RequestId, Outstanding>>,
    watermark: Mutex<AckWatermark>,
    writer: Mutex<Option<WriteHalfKind>>,
}

/// A reconnecting RPC client bound to one [`ClientConfig`].
///
/// Cloning shares the same connection and outstanding-request table:
/// every clone sees the same in-flight calls.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connects to the configured server, completes the handshake, and
    /// starts the background read loop.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let connector = build_connector(&config.tls_material()?)?;
        let inner = Arc::new(ClientInner {
            config,
            connector,
            next_request_id: AtomicU64::new(1),
            outstanding: Mutex::new(HashMap::new()),
            watermark: Mutex::new(AckWatermark::new()),
            writer: Mutex::new(None),
        });

        let client = Self { inner };
        client.reconnect_once().await?;
        Ok(client)
    }

    /// Issues one RPC call and waits for its reply, transparently
    /// surviving any number of reconnects in between.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::SeqCst);
        let highest_reply_seen = self.inner.watermark.lock().await.highest_consecutive();
        let envelope = RequestEnvelope {
            method: method.into(),
            params,
            my_unique_id: self.inner.config.my_unique_id.clone(),
            request_id,
            highest_reply_seen,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut outstanding = self.inner.outstanding.lock().await;
            outstanding.insert(request_id, Outstanding {
                envelope: envelope.clone(),
                reply_tx,
            });
        }

        self.write_with_retry(&envelope).await;

        let reply = reply_rx.await.map_err(|_| ClientError::Closed)?;
        self.inner.outstanding.lock().await.remove(&request_id);
        self.inner
            .watermark
            .lock()
            .await
            .update_highest_consecutive_num(request_id);

        if reply.is_success() {
            Ok(reply.result)
        } else {
            Err(ClientError::Handler(reply.err_str))
        }
    }

    /// Writes `envelope`, reconnecting and retrying as many times as it
    /// takes. A write only fails here when the connection is down; once
    /// it succeeds the reply arrives asynchronously via the read loop.
    async fn write_with_retry(&self, envelope: &RequestEnvelope) {
        loop {
            if self.write_once(envelope).await.is_ok() {
                return;
            }
            self.reconnect_with_backoff().await;
        }
    }

    async fn write_once(&self, envelope: &RequestEnvelope) -> Result<()> {
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| anyhow!("not connected"))?;
        let payload = serde_json::to_vec(envelope)?;
        write_frame(writer, MessageType::Rpc, &payload, self.inner.config.deadline_io)
            .await
            .context("failed to write request frame")
    }

    async fn dial(&self) -> Result<(ReadHalfKind, WriteHalfKind)> {
        let cfg = &self.inner.config;
        let tcp = TcpStream::connect(cfg.server_addr)
            .await
            .with_context(|| format!("failed to connect to {}", cfg.server_addr))?;
        tcp.set_nodelay(true)?;

        let server_name: tokio_rustls::rustls::pki_types::ServerName<'static> = cfg
            .server_name
            .clone()
            .try_into()
            .map_err(|_| anyhow!("invalid server name {:?}", cfg.server_name))?;

        let tls = self
            .inner
            .connector
            .connect(server_name, tcp)
            .await
            .context("TLS handshake failed")?;

        Ok(split(tls))
    }

    /// Dials once, performs the handshake, installs the new writer, and
    /// spawns a fresh read loop. Does not resend outstanding requests;
    /// callers that need that do it themselves (see
    /// [`Client::reconnect_with_backoff`]).
    async fn reconnect_once(&self) -> Result<()> {
        let (reader, mut writer) = self.dial().await?;

        let handshake = serde_json::to_vec(&PassId(self.inner.config.my_unique_id.clone()))?;
        write_frame(
            &mut writer,
            MessageType::PassId,
            &handshake,
            self.inner.config.deadline_io,
        )
        .await?;

        *self.inner.writer.lock().await = Some(writer);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(Self::read_loop(inner, reader));

        self.resend_outstanding().await
    }

    /// Retries [`Client::reconnect_once`] with capped exponential
    /// backoff until it succeeds.
    async fn reconnect_with_backoff(&self) {
        let mut backoff = Duration::from_millis(50);
        loop {
            match self.reconnect_once().await {
                Ok(()) => return,
                Err(e) => {
                    warn!("reconnect failed, retrying in {backoff:?}: {e}");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                },
            }
        }
    }

    async fn resend_outstanding(&self) -> Result<()> {
        let envelopes: Vec<RequestEnvelope> = {
            let outstanding = self.inner.outstanding.lock().await;
            outstanding.values().map(|o| o.envelope.clone()).collect()
        };
        for envelope in envelopes {
            self.write_once(&envelope).await?;
        }
        Ok(())
    }

    async fn read_loop(inner: Arc<ClientInner>, mut reader: ReadHalfKind) {
        loop {
            let frame = match read_frame(&mut reader, inner.config.deadline_io).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("client read loop ended: {e}");
                    *inner.writer.lock().await = None;
                    return;
                },
            };

            if frame.message_type != MessageType::Rpc {
                warn!("unexpected handshake frame on established connection");
                continue;
            }

            let reply: ReplyEnvelope = match serde_json::from_slice(&frame.payload) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("malformed reply envelope: {e}");
                    continue;
                },
            };

            let removed = {
                let mut outstanding = inner.outstanding.lock().await;
                outstanding.remove(&reply.request_id)
            };
            if let Some(Outstanding { reply_tx, .. }) = removed {
                let _ = reply_tx.send(reply);
            } else {
                debug!("reply for unknown or already-delivered request {}", reply.request_id);
            }
        }
    }

    /// Closes the underlying connection. Outstanding calls will observe
    /// [`ClientError::Closed`] once their channel is dropped.
    pub async fn close(&self) {
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.inner.outstanding.lock().await.clear();
    }

    /// The client's configured identifier, stable across reconnects.
    pub fn my_unique_id(&self) -> &str {
        &self.inner.config.my_unique_id
    }

    /// Used to surface whether the last known write path is usable;
    /// mainly useful in tests.
    pub async fn is_connected(&self) -> bool {
        self.inner.writer.lock().await.is_some()
    }
}
