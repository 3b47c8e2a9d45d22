// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The RPC server: accept loop, per-connection service loop, dispatch
//! workers, completed-reply cache, and the trim daemon that ages it out.

/// TCP/TLS accept loop and reconnect-takeover handoff.
pub mod accept;
/// Per-connection write path and in-flight dispatch tracking.
pub mod connection;
/// The per-request dispatch worker.
pub mod dispatch;
/// The server façade.
#[allow(clippy::module_inception)]
pub mod server;
/// The per-connection service loop.
pub mod service;
/// Per-client session state.
pub mod session;
/// The ACK-based and TTL-based trim passes.
pub mod trim;
