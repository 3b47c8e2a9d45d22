// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The server façade: construct, register handlers, start accepting
//! connections, and shut down. The accept loop and trim daemon each run
//! off a cloned `Arc<Server>`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cfg::config::ServerConfig;
use crate::registry::{ClientIdentifier, Registry};
use crate::server::connection::ForceCloseable;
use crate::server::session::SessionHandle;
use crate::tls::build_acceptor;

/// The running RPC server: owns the method registry, the per-client
/// session map, the live-connection registry, and the TLS acceptor.
pub struct Server {
    config: ServerConfig,
    registry: Registry,
    sessions: DashMap<ClientIdentifier, Arc<SessionHandle>>,
    connections: DashMap<u64, Arc<dyn ForceCloseable>>,
    next_connection_id: AtomicU64,
    acceptor: TlsAcceptor,
    shutdown: CancellationToken,
}

impl Server {
    /// Builds a new server bound to `config`, ready to accept
    /// connections once [`Server::run`] is called.
    pub fn new(config: ServerConfig, registry: Registry) -> Result<Arc<Self>> {
        let acceptor = build_acceptor(&config.tls_material()?).context("building TLS acceptor")?;

        let server = Arc::new(Self {
            config,
            registry,
            sessions: DashMap::new(),
            connections: DashMap::new(),
            next_connection_id: AtomicU64::new(0),
            acceptor,
            shutdown: CancellationToken::new(),
        });

        Ok(server)
    }

    /// Registers `name` against an async handler. See
    /// [`Registry::register`] for the handler signature.
    pub fn register<Req, Rep, F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        Req: serde::de::DeserializeOwned + Send + 'static,
        Rep: serde::Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Rep, String>> + Send + 'static,
    {
        self.registry.register(name, handler);
    }

    /// Binds the listener and runs the accept loop and trim daemon
    /// until [`Server::close`] is called. Resolves once shutdown has
    /// been requested and the accept loop has exited.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.bind_addr))?;
        info!("listening on {}", self.config.bind_addr);

        let trim_server = Arc::clone(self);
        let trim_handle = tokio::spawn(crate::server::trim::run(trim_server));

        crate::server::accept::run(Arc::clone(self), listener, self.acceptor.clone()).await;

        trim_handle.abort();
        Ok(())
    }

    /// Requests shutdown: sets halting, force-closes every live
    /// connection (waking any service loop blocked on a read), then
    /// waits for every service loop and every dispatch worker to drain
    /// before returning.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let live: Vec<u64> = self.connections.iter().map(|e| *e.key()).collect();
        for id in live {
            if let Some((_, conn)) = self.connections.remove(&id) {
                conn.force_close().await;
            }
        }

        let sessions: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        for session in sessions {
            loop {
                let notified = session.prior_exited.notified();
                {
                    let guard = session.state.lock().await;
                    if !guard.occupied && guard.in_flight == 0 {
                        break;
                    }
                }
                notified.await;
            }
        }
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registers a newly accepted connection in the live-connection
    /// registry, returning the id to pass to
    /// [`Server::unregister_connection`] once its service loop exits.
    pub(crate) fn register_connection(&self, conn: Arc<dyn ForceCloseable>) -> u64 {
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        self.connections.insert(id, conn);
        id
    }

    pub(crate) fn unregister_connection(&self, id: u64) {
        self.connections.remove(&id);
    }

    pub(crate) fn sessions(&self) -> &DashMap<ClientIdentifier, Arc<SessionHandle>> {
        &self.sessions
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn io_deadline(&self) -> Duration {
        self.config.deadline_io
    }

    pub(crate) fn short_trim(&self) -> Duration {
        self.config.short_trim
    }

    pub(crate) fn long_trim(&self) -> Duration {
        self.config.long_trim
    }

    pub(crate) fn completed_long_ttl(&self) -> Duration {
        self.config.completed_long_ttl()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Total number of completed replies cached across every session,
    /// mainly useful for tests and metrics.
    pub async fn completed_count(&self) -> usize {
        let mut total = 0;
        for entry in self.sessions.iter() {
            total += entry.value().state.lock().await.completed_count();
        }
        total
    }
}
