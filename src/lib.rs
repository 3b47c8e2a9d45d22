// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A reconnecting, at-most-once RPC transport.
//!
//! A single server accepts framed, length-prefixed requests from many
//! long-lived clients identified by a caller-chosen [`ClientIdentifier`].
//! Completed replies are cached per client so that a client which
//! reconnects after a transient socket failure can safely resend an
//! in-flight request without the server re-running a non-idempotent
//! handler.

pub mod cfg;
pub mod client;
pub mod error;
pub mod registry;
pub mod server;
pub mod tls;
pub mod wire;

pub use client::runtime::Client;
pub use error::{ClientError, TransportError};
pub use registry::{ClientIdentifier, RequestId};
pub use server::server::Server;
