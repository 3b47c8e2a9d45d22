// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The method registry: register named handlers with typed
//! request/reply schemas, dispatch by name.
//!
//! The wire boundary erases the request/reply types down to
//! [`serde_json::Value`]; [`Registry::register`] keeps the erasure
//! behind a single type-erased thunk per method.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::METHOD_NOT_FOUND;

/// A client-chosen identifier, stable across reconnects.
pub type ClientIdentifier = String;

/// Monotonically increasing per-client request sequence number.
pub type RequestId = u64;

type BoxedReply = Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>;
type BoxedHandler = Arc<dyn Fn(serde_json::Value) -> BoxedReply + Send + Sync>;

/// The outcome of dispatching one request to a registered handler.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Ok(serde_json::Value),
    Error(String),
}

/// A name-keyed table of request handlers.
///
/// Cloning a [`Registry`] is cheap: it shares the underlying map via
/// [`Arc`], so the same registry can be handed to every dispatch worker
/// without copying.
#[derive(Clone, Default)]
pub struct Registry {
    handlers: Arc<DashMap<String, BoxedHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` against an async handler taking a typed request
    /// and returning a typed reply or an error message.
    ///
    /// The handler itself never sees transport concerns: a handler error
    /// becomes a cached [`HandlerOutcome::Error`], not a torn-down
    /// connection.
    pub fn register<Req, Rep, F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Rep: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Rep, String>> + Send + 'static,
    {
        let thunk: BoxedHandler = Arc::new(move |params: serde_json::Value| {
            let fut = {
                let parsed: Result<Req, _> = serde_json::from_value(params);
                let handler_call = match parsed {
                    Ok(req) => Some(handler(req)),
                    Err(_) => None,
                };
                async move {
                    match handler_call {
                        Some(fut) => match fut.await {
                            Ok(rep) => serde_json::to_value(rep)
                                .map_err(|e| format!("failed to serialize reply: {e}")),
                            Err(msg) => Err(msg),
                        },
                        None => Err("malformed request parameters".to_string()),
                    }
                }
            };
            Box::pin(fut) as BoxedReply
        });
        self.handlers.insert(name.into(), thunk);
    }

    /// Looks up `method` and, if present, invokes it with `params`.
    ///
    /// An unregistered method name yields [`HandlerOutcome::Error`] with
    /// the stable [`METHOD_NOT_FOUND`] sentinel rather than a transport
    /// error, so the transport layer still caches it as a completed
    /// reply and retries see the same answer.
    pub async fn dispatch(&self, method: &str, params: serde_json::Value) -> HandlerOutcome {
        let Some(handler) = self.handlers.get(method).map(|h| h.clone()) else {
            return HandlerOutcome::Error(METHOD_NOT_FOUND.to_string());
        };
        match handler(params).await {
            Ok(value) => HandlerOutcome::Ok(value),
            Err(msg) => HandlerOutcome::Error(msg),
        }
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}
