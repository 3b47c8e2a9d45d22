// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use retryrpc_rs::registry::Registry;
use serde::Deserialize;

use crate::integration_tests::common::start_server;

#[derive(Deserialize)]
struct CountRequest {}

/// S6: once the long-TTL pass has had time to run on an idle session,
/// its completed-reply cache is empty, and a fresh request under the
/// same identifier dispatches again rather than hitting a stale cache
/// entry.
#[tokio::test]
async fn idle_session_is_trimmed_by_the_ttl_pass() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_handler = Arc::clone(&calls);
    registry.register("Count", move |_req: CountRequest| {
        let calls = Arc::clone(&calls_for_handler);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(serde_json::json!({ "seen": true }))
        }
    });

    let harness = start_server(47106, registry, Duration::from_millis(20), Duration::from_millis(60))
        .await
        .expect("start server");

    let client = harness.connect("client-s6").await.expect("connect client");
    client.send("Count", serde_json::json!({})).await.expect("first call");
    assert_eq!(harness.server.completed_count().await, 1);
    client.close().await;

    // Outlast the long-TTL trim cadence by a comfortable margin.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.server.completed_count().await, 0);

    let client = harness.connect("client-s6").await.expect("reconnect client");
    client.send("Count", serde_json::json!({})).await.expect("second call");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.server.completed_count().await, 1);
}
