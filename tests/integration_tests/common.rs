// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use retryrpc_rs::cfg::config::{ClientConfig, PemSource, ServerConfig};
use retryrpc_rs::registry::Registry;
use retryrpc_rs::server::server::Server;
use retryrpc_rs::tls::build_connector;
use retryrpc_rs::wire::{MessageType, PassId, write_frame};
use retryrpc_rs::Client;
use tokio::io::{ReadHalf, WriteHalf, split};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// A running server plus the TLS material needed to connect more clients
/// to it, so individual scenarios can open as many connections as they
/// need (the high-level [`Client`] or a raw frame stream).
pub struct Harness {
    pub server: Arc<Server>,
    pub bind_addr: SocketAddr,
    cert_pem: String,
}

fn self_signed_pair() -> Result<(String, String)> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .context("failed to generate self-signed certificate")?;
    Ok((certified.cert.pem(), certified.key_pair.serialize_pem()))
}

/// Binds a server on `port` with `registry` and the given trim cadences.
/// Each scenario picks its own port so tests running concurrently in the
/// same process don't collide.
pub async fn start_server(
    port: u16,
    registry: Registry,
    short_trim: Duration,
    long_trim: Duration,
) -> Result<Harness> {
    let (cert_pem, key_pem) = self_signed_pair()?;
    let bind_addr: SocketAddr = format!("127.0.0.1:{port}").parse().expect("addr");

    let server_cfg = ServerConfig {
        bind_addr,
        cert_chain: PemSource { inline: Some(cert_pem.clone()), path: None },
        private_key: PemSource { inline: Some(key_pem), path: None },
        short_trim,
        long_trim,
        deadline_io: Duration::from_secs(5),
    };

    let server = Server::new(server_cfg, registry).context("building server")?;
    let accept_loop = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = accept_loop.run().await;
    });

    // Give the listener a moment to bind before any client dials.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(Harness { server, bind_addr, cert_pem })
}

impl Harness {
    fn client_config(&self, client_id: &str) -> ClientConfig {
        ClientConfig {
            my_unique_id: client_id.to_string(),
            server_addr: self.bind_addr,
            server_name: "localhost".to_string(),
            trusted_root: PemSource { inline: Some(self.cert_pem.clone()), path: None },
            deadline_io: Duration::from_secs(5),
        }
    }

    /// Connects a high-level, reconnecting [`Client`] under `client_id`.
    pub async fn connect(&self, client_id: &str) -> Result<Client> {
        Client::connect(self.client_config(client_id))
            .await
            .context("connecting client")
    }

    /// Opens a bare TLS stream and performs the handshake frame by hand,
    /// for scenarios that need to control exactly when the connection is
    /// dropped (below the level the high-level [`Client`] exposes).
    pub async fn raw_connect(
        &self,
        client_id: &str,
    ) -> Result<(ReadHalf<TlsStream<TcpStream>>, WriteHalf<TlsStream<TcpStream>>)> {
        let material = self.client_config(client_id).tls_material()?;
        let connector = build_connector(&material)?;

        let tcp = TcpStream::connect(self.bind_addr).await?;
        tcp.set_nodelay(true)?;
        let server_name: tokio_rustls::rustls::pki_types::ServerName<'static> =
            "localhost".try_into().map_err(|_| anyhow!("invalid server name"))?;
        let tls = connector.connect(server_name, tcp).await.context("TLS handshake failed")?;
        let (reader, mut writer) = split(tls);

        let handshake = serde_json::to_vec(&PassId(client_id.to_string()))?;
        write_frame(&mut writer, MessageType::PassId, &handshake, Duration::from_secs(5)).await?;

        Ok((reader, writer))
    }
}
